//! Cyclic state machine engine shared by the belt and supervisor protocols.
//!
//! The owning controller calls [`StateMachine::update`] exactly once per
//! control cycle, then switches on [`StateMachine::state`]. A state handler
//! requests a transition with [`StateMachine::set_state`]; the transition
//! is observed by the *next* `update()` call, which makes
//! [`StateMachine::state_changed`] true for exactly one cycle and resets
//! the cycles-in-state counter.

/// Trait implemented by the state enums driven by [`StateMachine`].
pub trait State: Copy + PartialEq {
    /// Human-readable name logged on state entry. An empty name suppresses
    /// the state-change log line for that state.
    fn display_name(&self) -> &'static str;
}

type LogCallback = Box<dyn Fn(&str)>;

pub struct StateMachine<S: State> {
    state: S,
    state_prev: S,
    state_changed: bool,
    cycles: u32,
    /// Time per cycle. Adjust to match the update() call frequency.
    pub ms_per_cycle: u16,
    log_callback: Option<LogCallback>,
}

impl<S: State> StateMachine<S> {
    pub fn new(initial: S, ms_per_cycle: u16) -> Self {
        Self {
            state: initial,
            state_prev: initial,
            state_changed: false,
            cycles: 0,
            ms_per_cycle,
            log_callback: None,
        }
    }

    /// Like [`StateMachine::new`], with a callback invoked once per
    /// transition with the new state's display name (unless empty).
    pub fn with_log(initial: S, ms_per_cycle: u16, log_callback: impl Fn(&str) + 'static) -> Self {
        let mut sm = Self::new(initial, ms_per_cycle);
        sm.log_callback = Some(Box::new(log_callback));
        sm
    }

    /// Record the desired next state; observed by the next `update()`.
    pub fn set_state(&mut self, state: S) {
        self.state = state;
    }

    pub fn state(&self) -> S {
        self.state
    }

    /// True for exactly the one `update()` call following a `set_state`
    /// to a different state.
    pub fn state_changed(&self) -> bool {
        self.state_changed
    }

    /// Advance the state machine by one cycle.
    pub fn update(&mut self) {
        self.state_changed = self.state != self.state_prev;
        if self.state_changed {
            if let Some(cb) = &self.log_callback {
                let name = self.state.display_name();
                if !name.is_empty() {
                    cb(name);
                }
            }
            self.cycles = 0;
            self.state_prev = self.state;
        } else if self.cycles < u32::MAX {
            self.cycles += 1;
        }
    }

    pub fn cycles_in_state(&self) -> u32 {
        self.cycles
    }

    /// Time in the current state in milliseconds, saturating at `u32::MAX`.
    pub fn time_in_state(&self) -> u32 {
        let result = u64::from(self.cycles) * u64::from(self.ms_per_cycle);
        u32::try_from(result).unwrap_or(u32::MAX)
    }

    /// Restart the time-in-state counter without a transition.
    pub fn reset_time_in_state(&mut self) {
        self.cycles = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Phase {
        Warmup,
        Run,
        Quiet,
    }

    impl State for Phase {
        fn display_name(&self) -> &'static str {
            match self {
                Phase::Warmup => "Warming up",
                Phase::Run => "Running",
                Phase::Quiet => "",
            }
        }
    }

    #[test]
    fn state_changed_is_true_for_exactly_one_update() {
        let mut sm = StateMachine::new(Phase::Warmup, 5);
        sm.update();
        assert!(!sm.state_changed());

        sm.set_state(Phase::Run);
        sm.update();
        assert!(sm.state_changed());
        sm.update();
        assert!(!sm.state_changed());
    }

    #[test]
    fn cycles_reset_on_transition_and_convert_to_ms() {
        let mut sm = StateMachine::new(Phase::Warmup, 10);
        for _ in 0..7 {
            sm.update();
        }
        // First update after construction does not count as a transition.
        assert_eq!(sm.cycles_in_state(), 7);
        assert_eq!(sm.time_in_state(), 70);

        sm.set_state(Phase::Run);
        sm.update();
        assert_eq!(sm.cycles_in_state(), 0);
        assert_eq!(sm.time_in_state(), 0);
    }

    #[test]
    fn time_in_state_saturates() {
        let mut sm = StateMachine::new(Phase::Warmup, u16::MAX);
        sm.cycles = u32::MAX;
        sm.update();
        assert_eq!(sm.cycles_in_state(), u32::MAX);
        assert_eq!(sm.time_in_state(), u32::MAX);
    }

    #[test]
    fn callback_fires_once_per_transition_and_empty_name_is_suppressed() {
        let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let mut sm =
            StateMachine::with_log(Phase::Warmup, 1, move |name: &str| {
                sink.borrow_mut().push(name.to_string());
            });

        sm.update();
        sm.set_state(Phase::Run);
        sm.update();
        sm.update();
        sm.set_state(Phase::Quiet); // empty display name
        sm.update();
        sm.set_state(Phase::Warmup);
        sm.update();

        assert_eq!(*log.borrow(), vec!["Running", "Warming up"]);
    }

    proptest! {
        #[test]
        fn time_in_state_is_cycles_times_period(
            ms in 1u16..=1_000,
            updates in 1u32..200,
        ) {
            let mut sm = StateMachine::new(Phase::Run, ms);
            for _ in 0..updates {
                sm.update();
            }
            prop_assert_eq!(sm.cycles_in_state(), updates);
            prop_assert_eq!(sm.time_in_state(), updates * u32::from(ms));

            // A transition restarts the count from zero.
            sm.set_state(Phase::Warmup);
            sm.update();
            prop_assert_eq!(sm.time_in_state(), 0);
            sm.update();
            prop_assert_eq!(sm.time_in_state(), u32::from(ms));
        }
    }

    #[test]
    fn reset_time_in_state_keeps_state() {
        let mut sm = StateMachine::new(Phase::Run, 5);
        for _ in 0..4 {
            sm.update();
        }
        sm.reset_time_in_state();
        assert_eq!(sm.time_in_state(), 0);
        assert_eq!(sm.state(), Phase::Run);
        sm.update();
        assert!(!sm.state_changed());
    }
}
