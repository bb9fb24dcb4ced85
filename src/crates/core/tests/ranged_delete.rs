use async_trait::async_trait;
use powertools_core::{
    ChatHostSim, ConfirmPrompt, DeletionOutcome, MemoryStore, PowerTools,
    PowerToolsConfig, PowerToolsError, PowerToolsEvent, RunState, SimOptions, SimTurn,
    StaticConfirm, TurnIdentity,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct RecordingPrompt {
    answer: bool,
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl ConfirmPrompt for RecordingPrompt {
    async fn confirm(&self, message: &str) -> bool {
        self.messages.lock().unwrap().push(message.to_string());
        self.answer
    }
}

fn transcript(count: usize) -> Vec<SimTurn> {
    (0..count)
        .map(|i| {
            let turn = if i % 2 == 0 {
                SimTurn::user(format!("question {}", i))
            } else {
                SimTurn::model(format!("answer {}", i))
            };
            turn.with_id(format!("t{}", i))
        })
        .collect()
}

fn build(sim: &ChatHostSim, prompt: Arc<dyn ConfirmPrompt>, config: PowerToolsConfig) -> PowerTools {
    PowerTools::new(sim.host(), Arc::new(MemoryStore::new()), prompt, config).expect("powertools")
}

fn drain_status(rx: &mut tokio::sync::broadcast::Receiver<PowerToolsEvent>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let PowerToolsEvent::Status { message, .. } = event {
            lines.push(message);
        }
    }
    lines
}

#[tokio::test(start_paused = true)]
async fn stops_inclusively_at_first_boundary() {
    let sim = ChatHostSim::with_turns(SimOptions::default(), &transcript(6)).expect("sim");
    let prompt = Arc::new(RecordingPrompt {
        answer: true,
        messages: Mutex::new(Vec::new()),
    });
    let tools = build(&sim, prompt.clone(), PowerToolsConfig::default());
    let mut rx = tools.events().subscribe();

    assert!(tools.boundaries().toggle(&TurnIdentity::from("t3")).await);
    let turns = sim.turns();
    let report = tools.orchestrator().delete_from(turns[1]).await.expect("ranged delete");

    assert_eq!(report.outcome, DeletionOutcome::Completed);
    assert_eq!(report.deleted, 3);
    assert_eq!(report.eligible, 3);
    assert_eq!(sim.turn_texts(), vec!["question 0", "question 4", "answer 5"]);
    assert_eq!(
        prompt.messages.lock().unwrap().as_slice(),
        ["Delete 3 turns up to boundary flag?"]
    );

    let status = drain_status(&mut rx);
    assert!(status.contains(&"Deleting 1/3...".to_string()));
    assert!(status.contains(&"Deleting 3/3...".to_string()));
    assert_eq!(status.last().map(String::as_str), Some("Complete. Deleted: 3"));
    assert_eq!(tools.orchestrator().state(), RunState::Idle);
    assert_eq!(tools.orchestrator().last_outcome(), Some(DeletionOutcome::Completed));
}

#[tokio::test(start_paused = true)]
async fn deletes_to_end_without_boundary() {
    let sim = ChatHostSim::with_turns(SimOptions::default(), &transcript(5)).expect("sim");
    let prompt = Arc::new(RecordingPrompt {
        answer: true,
        messages: Mutex::new(Vec::new()),
    });
    let tools = build(&sim, prompt.clone(), PowerToolsConfig::default());

    let start = sim.turns()[2];
    let report = tools.orchestrator().delete_from(start).await.expect("ranged delete");

    assert_eq!(report.deleted, 3);
    assert_eq!(sim.turns().len(), 2);
    assert_eq!(
        prompt.messages.lock().unwrap().as_slice(),
        ["Delete 3 turns to end of conversation?"]
    );
    assert_eq!(sim.open_menus(), 0);
    assert_eq!(sim.open_dialogs(), 0);
}

#[tokio::test(start_paused = true)]
async fn boundary_on_start_turn_deletes_only_it() {
    let sim = ChatHostSim::with_turns(SimOptions::default(), &transcript(4)).expect("sim");
    let tools = build(&sim, Arc::new(StaticConfirm(true)), PowerToolsConfig::default());

    tools.boundaries().toggle(&TurnIdentity::from("t0")).await;
    let report = tools.orchestrator().delete_from(sim.turns()[0]).await.expect("ranged delete");

    assert_eq!(report.deleted, 1);
    assert_eq!(sim.turns().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn declined_prompt_changes_nothing() {
    let sim = ChatHostSim::with_turns(SimOptions::default(), &transcript(3)).expect("sim");
    let tools = build(&sim, Arc::new(StaticConfirm(false)), PowerToolsConfig::default());

    let report = tools.orchestrator().delete_from(sim.turns()[0]).await.expect("ranged delete");

    assert_eq!(report.outcome, DeletionOutcome::Declined);
    assert_eq!(report.deleted, 0);
    assert_eq!(sim.turns().len(), 3);
    assert_eq!(tools.orchestrator().last_outcome(), None);
    assert_eq!(tools.orchestrator().state(), RunState::Idle);
}

#[tokio::test(start_paused = true)]
async fn refuses_while_model_is_generating() {
    let sim = ChatHostSim::with_turns(
        SimOptions {
            generating: true,
            ..Default::default()
        },
        &transcript(3),
    )
    .expect("sim");
    let prompt = Arc::new(RecordingPrompt {
        answer: true,
        messages: Mutex::new(Vec::new()),
    });
    let tools = build(&sim, prompt.clone(), PowerToolsConfig::default());
    let mut rx = tools.events().subscribe();

    let err = tools.orchestrator().delete_from(sim.turns()[0]).await.unwrap_err();

    assert!(matches!(err, PowerToolsError::ModelGenerating));
    assert!(err.is_precondition());
    assert_eq!(sim.turns().len(), 3);
    assert_eq!(sim.open_menus(), 0);
    assert!(prompt.messages.lock().unwrap().is_empty());
    assert_eq!(drain_status(&mut rx), vec!["⚠️ Model is generating. Aborting."]);
    assert_eq!(tools.orchestrator().state(), RunState::Idle);
}

#[tokio::test(start_paused = true)]
async fn start_node_that_is_not_a_turn_has_nothing_to_delete() {
    let sim = ChatHostSim::new(SimOptions::default()).expect("sim");
    let tools = build(&sim, Arc::new(StaticConfirm(true)), PowerToolsConfig::default());

    let stray = sim.dom().element(sim.session(), "div", &[]).expect("element");
    let err = tools.orchestrator().delete_from(stray).await.unwrap_err();
    assert!(matches!(err, PowerToolsError::NoMatchingTurns));
}

#[tokio::test(start_paused = true)]
async fn budget_exhaustion_reports_timeout_and_frees_slot() {
    let sim = ChatHostSim::with_turns(SimOptions::default(), &transcript(6)).expect("sim");
    let mut config = PowerToolsConfig::default();
    config.timing.max_delete_duration_ms = 2_000;
    let tools = build(&sim, Arc::new(StaticConfirm(true)), config);
    let mut rx = tools.events().subscribe();

    let report = tools.orchestrator().delete_from(sim.turns()[0]).await.expect("ranged delete");

    assert_eq!(report.outcome, DeletionOutcome::TimedOut);
    assert!(report.deleted >= 1);
    assert!(report.deleted <= report.eligible);
    assert_eq!(sim.turns().len(), 6 - report.deleted);
    assert!(drain_status(&mut rx).contains(&"Emergency stop: Timeout".to_string()));
    assert_eq!(tools.orchestrator().state(), RunState::Idle);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_between_turns_and_rejects_concurrent_runs() {
    let sim = ChatHostSim::with_turns(SimOptions::default(), &transcript(5)).expect("sim");
    let tools = build(&sim, Arc::new(StaticConfirm(true)), PowerToolsConfig::default());
    let orchestrator = tools.orchestrator().clone();
    let start = sim.turns()[0];

    let run = tokio::spawn(async move { orchestrator.delete_from(start).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(tools.orchestrator().state(), RunState::Running);

    let busy = tools.orchestrator().delete_from(start).await.unwrap_err();
    assert!(matches!(busy, PowerToolsError::AlreadyRunning));

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert!(tools.orchestrator().stop());

    let report = run.await.expect("join").expect("ranged delete");
    assert_eq!(report.outcome, DeletionOutcome::Stopped);
    assert!(report.deleted >= 1 && report.deleted < 5);
    assert_eq!(sim.turns().len(), 5 - report.deleted);
    assert_eq!(tools.orchestrator().state(), RunState::Idle);
}

#[tokio::test(start_paused = true)]
async fn detached_turns_are_skipped() {
    let sim = ChatHostSim::with_turns(SimOptions::default(), &transcript(3)).expect("sim");
    let tools = build(&sim, Arc::new(StaticConfirm(true)), PowerToolsConfig::default());
    let orchestrator = tools.orchestrator().clone();
    let turns = sim.turns();
    let start = turns[0];

    let run = tokio::spawn(async move { orchestrator.delete_from(start).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    // The host drops the last turn on its own while the run is in progress.
    sim.dom().remove(turns[2]).expect("remove");

    let report = run.await.expect("join").expect("ranged delete");
    assert_eq!(report.outcome, DeletionOutcome::Completed);
    assert_eq!(report.deleted, 2);
    assert!(sim.turns().is_empty());
    assert_eq!(sim.dom().clicks_on(turns[2]), 0);
}
