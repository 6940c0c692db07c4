//! Property tests for the event bus core.
//!
//! Runs on host only — proptest is not available for ESP32 targets.

#![cfg(not(target_os = "espidf"))]

use proptest::prelude::*;

use perse_rover::bus::{
    BatteryEvent, Button, CommEvent, Event, EventBus, EventQueue, Facility, InputAction,
    InputEvent, PairEvent, WifiEvent,
};
use perse_rover::services::battery::PowerLevel;

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        prop_oneof![Just(WifiEvent::Connected), Just(WifiEvent::Disconnected)]
            .prop_map(Event::Wifi),
        (
            prop_oneof![Just(Button::Pair), Just(Button::Headlights)],
            prop_oneof![Just(InputAction::Press), Just(InputAction::Release)],
        )
            .prop_map(|(button, action)| Event::Input(InputEvent { button, action })),
        any::<bool>().prop_map(|success| Event::Pair(PairEvent { success })),
        prop_oneof![
            Just(PowerLevel::Normal),
            Just(PowerLevel::Low),
            Just(PowerLevel::Critical)
        ]
        .prop_map(|level| Event::Battery(BatteryEvent { level })),
        prop_oneof![
            Just(CommEvent::ControllerConnected),
            Just(CommEvent::ControllerDisconnected)
        ]
        .prop_map(Event::Comm),
    ]
}

const ALL_FACILITIES: [Facility; 5] = [
    Facility::Wifi,
    Facility::Input,
    Facility::Pair,
    Facility::Battery,
    Facility::Comm,
];

proptest! {
    /// Whatever is posted, a roomy listener receives its facility's
    /// events in post order.
    #[test]
    fn delivery_is_fifo_per_facility(events in proptest::collection::vec(arb_event(), 0..64)) {
        let bus = EventBus::new();
        let queue = EventQueue::new(64);
        bus.listen(Facility::Input, &queue);

        for event in &events {
            bus.post(*event);
        }

        let expected: Vec<Event> = events
            .iter()
            .copied()
            .filter(|e| e.facility() == Facility::Input)
            .collect();
        for want in expected {
            prop_assert_eq!(queue.get(None), Ok(want));
        }
        prop_assert!(queue.is_empty());
    }

    /// A bounded queue never exceeds its capacity and keeps exactly
    /// the newest entries.
    #[test]
    fn full_queue_keeps_the_newest(
        capacity in 1usize..16,
        count in 0usize..64,
    ) {
        let bus = EventBus::new();
        let queue = EventQueue::new(capacity);
        bus.listen(Facility::Pair, &queue);

        for i in 0..count {
            bus.post(Event::Pair(PairEvent { success: i % 2 == 0 }));
        }
        prop_assert!(queue.len() <= capacity);

        let kept = count.min(capacity);
        for i in (count - kept)..count {
            prop_assert_eq!(
                queue.get(None),
                Ok(Event::Pair(PairEvent { success: i % 2 == 0 }))
            );
        }
        prop_assert!(queue.is_empty());
    }

    /// Events only ever reach listeners of their own facility.
    #[test]
    fn routing_respects_facilities(events in proptest::collection::vec(arb_event(), 0..64)) {
        let bus = EventBus::new();
        let queues: Vec<_> = ALL_FACILITIES
            .iter()
            .map(|&facility| {
                let queue = EventQueue::new(64);
                bus.listen(facility, &queue);
                queue
            })
            .collect();

        for event in &events {
            bus.post(*event);
        }

        for (facility, queue) in ALL_FACILITIES.iter().zip(&queues) {
            let expected = events.iter().filter(|e| e.facility() == *facility).count();
            prop_assert_eq!(queue.len(), expected);
            while let Ok(event) = queue.get(Some(std::time::Duration::ZERO)) {
                prop_assert_eq!(event.facility(), *facility);
            }
        }
    }
}
