use powertools_core::{
    BulkKind, ChatHostSim, ControlOutcome, DeletionOutcome, HostDom, MemoryStore, NodeId,
    PowerTools, PowerToolsConfig, SidebarAction, SimOptions, SimTurn, StaticConfirm, TurnControl,
    TurnIdentity,
};
use std::sync::Arc;
use std::time::Duration;

fn build(sim: &ChatHostSim) -> PowerTools {
    PowerTools::new(
        sim.host(),
        Arc::new(MemoryStore::new()),
        Arc::new(StaticConfirm(true)),
        PowerToolsConfig::default(),
    )
    .expect("powertools")
}

fn controls(sim: &ChatHostSim, turn: NodeId) -> (Vec<NodeId>, Vec<NodeId>) {
    let dom = sim.dom();
    (
        dom.query_selector_all(turn, ".delete-boundary-button").expect("query"),
        dom.query_selector_all(turn, ".delete-below-button").expect("query"),
    )
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn existing_and_new_turns_get_one_set_of_controls() {
    let sim = ChatHostSim::with_turns(SimOptions::default(), &[SimTurn::user("a"), SimTurn::model("b")])
        .expect("sim");
    let tools = build(&sim);

    let _task = tools.start_injector();
    settle().await;
    let added = sim.append_turn(&SimTurn::user("c")).expect("append");
    settle().await;

    for turn in sim.turns() {
        let (boundary, below) = controls(&sim, turn);
        assert_eq!((boundary.len(), below.len()), (1, 1), "turn {}", turn);
        assert_eq!(sim.dom().attribute(turn, "data-boundary-injected").as_deref(), Some("true"));
    }
    assert!(sim.turns().contains(&added));
    assert_eq!(tools.registry().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn overlapping_notifications_do_not_duplicate_controls() {
    let sim = ChatHostSim::new(SimOptions::default()).expect("sim");
    let tools = build(&sim);
    let _task = tools.start_injector();
    settle().await;

    let turn = sim.append_turn(&SimTurn::user("moved")).expect("append");
    // Re-parenting the turn reports it a second time.
    let wrapper = sim.dom().element(sim.session(), "div", &[]).expect("wrapper");
    sim.dom().append_child(wrapper, turn).expect("move");
    settle().await;

    let injector = tools.injector();
    let (first, second) = tokio::join!(injector.process_turn(turn), injector.process_turn(turn));
    assert!(!first && !second);
    assert_eq!(injector.scan_existing().await, 0);

    let (boundary, below) = controls(&sim, turn);
    assert_eq!((boundary.len(), below.len()), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn concurrent_processing_injects_once() {
    let sim = ChatHostSim::with_turns(SimOptions::default(), &[SimTurn::user("x")]).expect("sim");
    let tools = build(&sim);
    let turn = sim.turns()[0];

    let injector = tools.injector();
    let (first, second) = tokio::join!(injector.process_turn(turn), injector.process_turn(turn));
    assert!(first ^ second);

    let (boundary, below) = controls(&sim, turn);
    assert_eq!((boundary.len(), below.len()), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn turn_without_action_bar_is_skipped_but_marked() {
    let sim = ChatHostSim::with_turns(
        SimOptions {
            action_bar: false,
            ..Default::default()
        },
        &[SimTurn::user("bare")],
    )
    .expect("sim");
    let tools = build(&sim);
    let turn = sim.turns()[0];

    assert!(!tools.injector().process_turn(turn).await);
    assert_eq!(sim.dom().attribute(turn, "data-boundary-injected").as_deref(), Some("true"));
    assert!(tools.registry().is_empty());
    assert!(!tools.injector().process_turn(turn).await);
}

#[tokio::test(start_paused = true)]
async fn boundary_turns_render_active() {
    let sim = ChatHostSim::with_turns(
        SimOptions::default(),
        &[SimTurn::user("keep").with_id("keep"), SimTurn::user("drop").with_id("drop")],
    )
    .expect("sim");
    let tools = build(&sim);
    tools.boundaries().toggle(&TurnIdentity::from("keep")).await;

    assert_eq!(tools.injector().scan_existing().await, 2);
    let turns = sim.turns();
    let (keep, _) = controls(&sim, turns[0]);
    let (drop, _) = controls(&sim, turns[1]);
    assert!(sim.dom().has_class(keep[0], "active"));
    assert!(!sim.dom().has_class(drop[0], "active"));
}

#[tokio::test(start_paused = true)]
async fn clicks_route_to_toggle_and_ranged_delete() {
    let sim = ChatHostSim::with_turns(
        SimOptions::default(),
        &[
            SimTurn::user("one").with_id("1"),
            SimTurn::model("two").with_id("2"),
            SimTurn::user("three").with_id("3"),
            SimTurn::model("four").with_id("4"),
        ],
    )
    .expect("sim");
    let tools = build(&sim);
    tools.injector().scan_existing().await;
    let turns = sim.turns();

    let (flag, _) = controls(&sim, turns[2]);
    let outcome = tools.handle_click(flag[0]).await.expect("toggle");
    assert_eq!(outcome, ControlOutcome::BoundaryToggled(true));
    assert!(sim.dom().has_class(flag[0], "active"));
    assert!(tools.boundaries().is_boundary(&TurnIdentity::from("3")).await);

    let (_, below) = controls(&sim, turns[1]);
    match tools.handle_click(below[0]).await.expect("delete below") {
        ControlOutcome::Deletion(report) => {
            assert_eq!(report.outcome, DeletionOutcome::Completed);
            assert_eq!(report.deleted, 2);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(sim.turn_texts(), vec!["one", "four"]);

    let stray = sim.dom().body();
    assert_eq!(tools.handle_click(stray).await.expect("ignored"), ControlOutcome::Ignored);
}

#[tokio::test(start_paused = true)]
async fn clearing_boundaries_resets_controls() {
    let sim = ChatHostSim::with_turns(
        SimOptions::default(),
        &[SimTurn::user("a").with_id("a"), SimTurn::user("b").with_id("b")],
    )
    .expect("sim");
    let tools = build(&sim);
    tools.injector().scan_existing().await;

    for turn in sim.turns() {
        assert!(tools.toggle_boundary(turn).await);
    }
    let flags = tools.registry().buttons_of(TurnControl::ToggleBoundary);
    assert!(flags.iter().all(|b| sim.dom().has_class(*b, "active")));

    tools.handle_action(SidebarAction::ClearBoundaries).await.expect("clear");

    assert!(flags.iter().all(|b| !sim.dom().has_class(*b, "active")));
    assert!(tools.boundaries().load().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stopped_injector_ignores_new_turns() {
    let sim = ChatHostSim::new(SimOptions::default()).expect("sim");
    let tools = build(&sim);

    let task = tools.start_injector();
    settle().await;
    tools.stop_injector();
    task.await.expect("injector task");

    let turn = sim.append_turn(&SimTurn::user("late")).expect("append");
    settle().await;
    assert_eq!(controls(&sim, turn), (vec![], vec![]));

    // A fresh subscription picks it up again.
    let _task = tools.start_injector();
    settle().await;
    let (boundary, below) = controls(&sim, turn);
    assert_eq!((boundary.len(), below.len()), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn bulk_delete_prunes_controls_of_removed_turns() {
    let turns: Vec<SimTurn> = (0..8).map(|i| SimTurn::user(format!("note {}", i))).collect();
    let sim = ChatHostSim::with_turns(SimOptions::default(), &turns).expect("sim");
    let tools = build(&sim);
    let _task = tools.start_injector();
    settle().await;
    assert_eq!(tools.registry().len(), 16);

    let report = tools
        .handle_action(SidebarAction::BulkDelete(BulkKind::Text))
        .await
        .expect("bulk delete")
        .expect("report");
    assert_eq!(report.deleted, 8);
    assert!(sim.turns().is_empty());
    assert!(tools.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn click_on_control_of_removed_turn_is_ignored() {
    let sim = ChatHostSim::with_turns(
        SimOptions::default(),
        &[SimTurn::user("gone").with_id("gone"), SimTurn::model("kept").with_id("kept")],
    )
    .expect("sim");
    let tools = build(&sim);
    tools.injector().scan_existing().await;
    let gone = sim.turns()[0];
    let (_, below) = controls(&sim, gone);

    sim.dom().remove(gone).expect("remove");

    assert_eq!(tools.handle_click(below[0]).await.expect("click"), ControlOutcome::Ignored);
    assert_eq!(tools.orchestrator().last_outcome(), None);
    assert_eq!(sim.turn_texts(), vec!["kept"]);
    assert_eq!(tools.registry().len(), 2);
}
