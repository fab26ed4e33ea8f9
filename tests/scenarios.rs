use std::cell::RefCell;
use std::rc::Rc;

use pnsim::net::*;

fn with_black() -> Net {
    let mut net = Net::empty();
    net.add_token_kind(TokenKind::new("black", Color::BLACK)).unwrap();
    net
}

#[test]
fn output_only_transition_stops_at_capacity() {
    let mut net = with_black();
    net.add_place(Place::new("P").with_capacity(5)).unwrap();
    net.add_transition(Transition::new("T")).unwrap();
    net.add_arc(Arc::output("T", "P").with_weight("black", 3)).unwrap();

    assert_eq!(net.is_enabled("T"), Ok(true));
    net.fire("T").unwrap();
    assert_eq!(net.tokens_at("P", "black"), Ok(3));

    let before = net.marking().clone();
    assert_eq!(
        net.fire("T"),
        Err(NetError::CapacityExceeded {
            place: PlaceId::new("P"),
            total: 6,
            capacity: 5,
        })
    );
    assert_eq!(net.marking(), &before);
    assert_eq!(net.tokens_at("P", "black"), Ok(3));
}

#[test]
fn inhibitor_threshold_disables_at_equality() {
    let mut net = Net::empty();
    net.add_token_kind(TokenKind::new("red", Color::RED)).unwrap();
    net.add_place(Place::new("P")).unwrap();
    net.add_transition(Transition::new("T")).unwrap();
    net.add_arc(Arc::inhibitor("P", "T").with_weight("red", 3)).unwrap();
    net.set_count("P", "red", 2).unwrap();

    assert_eq!(net.is_enabled("T"), Ok(true));
    net.set_count("P", "red", 3).unwrap();
    assert_eq!(net.is_enabled("T"), Ok(false));
    assert_eq!(
        net.fire("T"),
        Err(NetError::TransitionNotEnabled(TransitionId::new("T")))
    );
}

#[test]
fn deleting_a_transition_removes_its_arcs_only() {
    let mut net = with_black();
    net.add_place(Place::new("P")).unwrap();
    net.add_place(Place::new("Q")).unwrap();
    net.add_transition(Transition::new("T")).unwrap();
    net.add_arc(Arc::input("P", "T").with_weight("black", 1)).unwrap();
    net.add_arc(Arc::output("T", "Q").with_weight("black", 1)).unwrap();
    net.set_count("P", "black", 2).unwrap();
    net.set_count("Q", "black", 1).unwrap();

    let removed = net
        .remove(&ComponentKey::Transition(TransitionId::new("T")))
        .unwrap();
    assert_eq!(removed.arcs.len(), 2);
    for arc in ["P TO T", "T TO Q"] {
        assert!(matches!(
            net.arc(arc),
            Err(NetError::ComponentNotFound {
                kind: ComponentKind::Arc,
                ..
            })
        ));
    }
    assert_eq!(net.tokens_at("P", "black"), Ok(2));
    assert_eq!(net.tokens_at("Q", "black"), Ok(1));
}

#[test]
fn fire_then_unfire_round_trips_with_functional_weights() {
    let mut net = Net::empty();
    net.add_token_kind(TokenKind::new("black", Color::BLACK)).unwrap();
    net.add_token_kind(TokenKind::new("red", Color::RED)).unwrap();
    net.add_place(Place::new("A")).unwrap();
    net.add_place(Place::new("B").with_capacity(20)).unwrap();
    net.add_transition(Transition::new("T")).unwrap();
    net.add_arc(
        Arc::input("A", "T")
            .with_expr("black", "#(black) / 2".parse().unwrap())
            .with_weight("red", 1),
    )
    .unwrap();
    net.add_arc(
        Arc::output("T", "B").with_expr("black", "#(A, black) + #(A, red)".parse().unwrap()),
    )
    .unwrap();

    for (black, red) in [(0, 1), (3, 2), (8, 5)] {
        net.set_count("A", "black", black).unwrap();
        net.set_count("A", "red", red).unwrap();
        net.set_count("B", "black", 0).unwrap();
        let before = net.marking().clone();
        let delta = net.fire("T").unwrap();
        assert_ne!(net.marking(), &before);
        net.unfire(&delta).unwrap();
        assert_eq!(net.marking(), &before);
    }
}

#[test]
fn rename_updates_every_reference_and_notifies_once() {
    let mut net = with_black();
    net.add_place(Place::new("P0")).unwrap();
    net.add_place(Place::new("P1")).unwrap();
    net.add_transition(Transition::new("T0")).unwrap();
    net.add_arc(Arc::input("P0", "T0").with_weight("black", 1)).unwrap();
    net.add_arc(Arc::output("T0", "P1").with_expr("black", WeightExpr::count_at("P0", "black")))
        .unwrap();
    net.set_count("P0", "black", 1).unwrap();

    let events = Rc::new(RefCell::new(Vec::new()));
    {
        let events = Rc::clone(&events);
        net.subscribe(move |event| events.borrow_mut().push(event.clone()));
    }
    net.rename(&ComponentKey::Place(PlaceId::new("P0")), "Source").unwrap();

    assert!(net.place("P0").is_err());
    assert!(net.arc("P0 TO T0").is_err());
    assert_eq!(net.arc("Source TO T0").unwrap().place(), "Source");
    assert_eq!(net.tokens_at("Source", "black"), Ok(1));
    assert!(
        net.arc("T0 TO P1")
            .unwrap()
            .weight("black")
            .unwrap()
            .references_place("Source")
    );
    assert_eq!(
        *events.borrow(),
        vec![NetEvent::Renamed {
            old: ComponentKey::Place(PlaceId::new("P0")),
            new: ComponentKey::Place(PlaceId::new("Source")),
        }]
    );

    let delta = net.fire("T0").unwrap();
    assert_eq!(delta.change("P1", "black"), 1);
}

#[test]
fn removal_and_restore_leave_an_identical_net() {
    let mut net = pnsim::models::philosophers(3).unwrap();
    let before = net.snapshot();
    let removed = net.remove(&ComponentKey::Place(PlaceId::new("Fork1"))).unwrap();
    assert_eq!(removed.arcs.len(), 4);
    assert!(net.arcs().all(|arc| arc.place() != "Fork1"));
    net.restore(removed).unwrap();
    assert_eq!(net.snapshot(), before);
}

#[test]
fn arc_ids_stay_unique_across_endpoint_names() {
    let mut net = with_black();
    net.add_place(Place::new("X")).unwrap();
    net.add_transition(Transition::new("Z")).unwrap();
    assert!(matches!(
        net.add_place(Place::new("X TO Y")),
        Err(NetError::InvalidIdentifier { .. })
    ));
    assert!(matches!(
        net.add_transition(Transition::new("Y TO Z")),
        Err(NetError::InvalidIdentifier { .. })
    ));
    assert_eq!(net.add_arc(Arc::input("X", "Z")), Ok(ArcId::new("X TO Z")));
    assert_eq!(net.arcs_len(), 1);
}

#[test]
fn huge_counts_are_refused_without_panicking() {
    let mut net = Net::empty();
    for kind in ["a", "b", "c", "d"] {
        net.add_token_kind(TokenKind::new(kind, Color::BLACK)).unwrap();
    }
    net.add_place(Place::new("P")).unwrap();
    net.add_transition(Transition::new("T")).unwrap();
    net.add_arc(Arc::output("T", "P").with_weight("d", 2)).unwrap();
    net.set_count("P", "a", i64::MAX).unwrap();
    net.set_count("P", "b", i64::MAX).unwrap();
    assert!(matches!(
        net.set_count("P", "c", i64::MAX),
        Err(NetError::CountOverflow { .. })
    ));

    let before = net.marking().clone();
    assert_eq!(net.is_enabled("T"), Ok(false));
    assert_eq!(
        net.fire("T"),
        Err(NetError::CountOverflow {
            place: PlaceId::new("P"),
        })
    );
    assert_eq!(net.marking(), &before);
}

#[test]
fn snapshot_reflects_current_state() {
    let mut net = pnsim::models::mutex().unwrap();
    net.fire("Enter1").unwrap();
    let snapshot = net.snapshot();
    assert_eq!(snapshot.places.len(), net.places_len());
    assert_eq!(snapshot.marking, *net.marking());
    assert_eq!(snapshot.marking.tokens("Critical1", "black"), 1);
    let json = io::to_json_string(&snapshot).unwrap();
    let back: NetSnapshot = io::from_json_str(&json).unwrap();
    assert_eq!(back, snapshot);
}
