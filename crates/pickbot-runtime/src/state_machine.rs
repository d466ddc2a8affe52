//! [`StateMachine`] – the pick-and-place task controller.
//!
//! One call to [`StateMachine::step`] per control tick.  Each step first
//! updates the failure counter from the tick's inputs, then evaluates the
//! current state's rule; the first matching branch wins.
//!
//! | State | Condition | Next | Label |
//! |---|---|---|---|
//! | `searching` | `lego_detected` | `find_target` | `LD` |
//! | `find_target` | `target_detected ∨ aligned_for_retrieve` | `align_for_retrieve` | `TD` |
//! | `align_for_retrieve` | `aligned_for_retrieve ∨ retrieving` | `retrieving` | `AFR` |
//! | `retrieving` | `pick_up_success` | `retrieved` | `PUS` |
//! | | `failed_pickup ∧ failed_pickups ≥ limit` | `error_retrieve` | `FPU>limit` |
//! | | `failed_pickup` | `align_for_retrieve` | `FPU` |
//! | `retrieved` | always | `transporting` | `R` |
//! | `transporting` | `safe_zone_detected` | `align_for_place` | `SZD` |
//! | `align_for_place` | `aligned_for_place ∨ placing` | `placing` | `AFP` |
//! | | `failed_pickup` | `error_place` | `FPU` |
//! | `placing` | `place_success` | `place_success` | `PS` |
//! | `place_success` | always | `return_home` | `PS` |
//! | `return_home` | `at_home` | `end` | `AH` |
//! | `error_retrieve` | `lego_detected` | `searching` | `LD` |
//! | | `at_home` | `return_home` | `AH` |
//! | `error_place` | `safe_zone_detected` | `align_for_place` | `SZD` |
//! | | `at_home` | `return_home` | `AH` |
//! | `end` | – | – | – |

use chrono::Utc;
use pickbot_types::{Inputs, State, StateContext, TransitionResult};

/// Default number of failed pickups before retrieval escalates to an error.
pub const DEFAULT_FAILED_PICKUP_LIMIT: u32 = 3;

#[derive(Debug, Clone)]
pub struct StateMachine {
    state: State,
    context: StateContext,
    failed_pickup_limit: u32,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_FAILED_PICKUP_LIMIT)
    }
}

impl StateMachine {
    /// A machine in [`State::Searching`] with zeroed counters.
    pub fn new(failed_pickup_limit: u32) -> Self {
        Self {
            state: State::default(),
            context: StateContext::default(),
            failed_pickup_limit,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn context(&self) -> &StateContext {
        &self.context
    }

    pub fn failed_pickup_limit(&self) -> u32 {
        self.failed_pickup_limit
    }

    /// Advance by one tick.
    ///
    /// The failure counter is updated before the transition rule runs and
    /// regardless of whether a transition fires.  Returns `None` when no
    /// branch matched; `state` and `transition_count` are then unchanged.
    pub fn step(&mut self, inputs: &Inputs) -> Option<TransitionResult> {
        if inputs.failed_pickup {
            self.context.failed_pickups = self.context.failed_pickups.saturating_add(1);
        }
        if inputs.pick_up_success || inputs.place_success {
            self.context.failed_pickups = 0;
        }

        let (target, label) = self.next(inputs)?;
        let result = TransitionResult {
            source: self.state,
            target,
            label,
        };
        self.state = target;
        self.context.transition_count += 1;
        self.context.last_transition_at = Some(Utc::now());
        Some(result)
    }

    fn next(&self, i: &Inputs) -> Option<(State, &'static str)> {
        use State::*;

        match self.state {
            Searching if i.lego_detected => Some((FindTarget, "LD")),
            FindTarget if i.target_detected || i.aligned_for_retrieve => Some((AlignForRetrieve, "TD")),
            AlignForRetrieve if i.aligned_for_retrieve || i.retrieving => Some((Retrieving, "AFR")),
            Retrieving if i.pick_up_success => Some((Retrieved, "PUS")),
            Retrieving if i.failed_pickup && self.context.failed_pickups >= self.failed_pickup_limit => {
                Some((ErrorRetrieve, "FPU>limit"))
            }
            Retrieving if i.failed_pickup => Some((AlignForRetrieve, "FPU")),
            Retrieved => Some((Transporting, "R")),
            Transporting if i.safe_zone_detected => Some((AlignForPlace, "SZD")),
            AlignForPlace if i.aligned_for_place || i.placing => Some((Placing, "AFP")),
            AlignForPlace if i.failed_pickup => Some((ErrorPlace, "FPU")),
            Placing if i.place_success => Some((PlaceSuccess, "PS")),
            PlaceSuccess => Some((ReturnHome, "PS")),
            ReturnHome if i.at_home => Some((End, "AH")),
            ErrorRetrieve if i.lego_detected => Some((Searching, "LD")),
            ErrorRetrieve if i.at_home => Some((ReturnHome, "AH")),
            ErrorPlace if i.safe_zone_detected => Some((AlignForPlace, "SZD")),
            ErrorPlace if i.at_home => Some((ReturnHome, "AH")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn machine_in(state: State) -> StateMachine {
        StateMachine {
            state,
            ..StateMachine::default()
        }
    }

    fn inputs_strategy() -> impl Strategy<Value = Inputs> {
        proptest::collection::vec(any::<bool>(), 12).prop_map(|b| Inputs {
            lego_detected: b[0],
            target_detected: b[1],
            safe_zone_detected: b[2],
            danger_zone_detected: b[3],
            aligned_for_retrieve: b[4],
            aligned_for_place: b[5],
            retrieving: b[6],
            placing: b[7],
            pick_up_success: b[8],
            place_success: b[9],
            failed_pickup: b[10],
            at_home: b[11],
        })
    }

    fn state_strategy() -> impl Strategy<Value = State> {
        proptest::sample::select(State::ALL.to_vec())
    }

    #[test]
    fn lego_detection_leaves_searching() {
        let mut sm = StateMachine::default();
        let result = sm
            .step(&Inputs {
                lego_detected: true,
                ..Inputs::default()
            })
            .unwrap();
        assert_eq!(result.source, State::Searching);
        assert_eq!(result.target, State::FindTarget);
        assert_eq!(result.label, "LD");
        assert_eq!(sm.state(), State::FindTarget);
        assert_eq!(sm.context().transition_count, 1);
        assert!(sm.context().last_transition_at.is_some());
    }

    #[test]
    fn no_matching_branch_is_a_no_op() {
        let mut sm = StateMachine::default();
        assert!(sm.step(&Inputs::default()).is_none());
        assert_eq!(sm.state(), State::Searching);
        assert_eq!(sm.context().transition_count, 0);
        assert!(sm.context().last_transition_at.is_none());
    }

    #[test]
    fn happy_path_reaches_end() {
        let mut sm = StateMachine::default();
        let ticks = [
            Inputs { lego_detected: true, ..Inputs::default() },
            Inputs { target_detected: true, ..Inputs::default() },
            Inputs { aligned_for_retrieve: true, ..Inputs::default() },
            Inputs { pick_up_success: true, ..Inputs::default() },
            Inputs::default(),
            Inputs { safe_zone_detected: true, ..Inputs::default() },
            Inputs { placing: true, ..Inputs::default() },
            Inputs { place_success: true, ..Inputs::default() },
            Inputs::default(),
            Inputs { at_home: true, ..Inputs::default() },
        ];
        let labels: Vec<_> = ticks.iter().filter_map(|i| sm.step(i)).map(|r| r.label).collect();
        assert_eq!(labels, ["LD", "TD", "AFR", "PUS", "R", "SZD", "AFP", "PS", "PS", "AH"]);
        assert_eq!(sm.state(), State::End);
        assert_eq!(sm.context().transition_count, 10);
    }

    #[test]
    fn unconditional_states_always_advance() {
        let mut sm = machine_in(State::Retrieved);
        assert_eq!(sm.step(&Inputs::default()).unwrap().target, State::Transporting);

        let mut sm = machine_in(State::PlaceSuccess);
        assert_eq!(sm.step(&Inputs::default()).unwrap().target, State::ReturnHome);
    }

    #[test]
    fn escalation_fires_when_counter_reaches_limit() {
        let mut sm = machine_in(State::Retrieving);
        sm.context.failed_pickups = sm.failed_pickup_limit() - 1;
        let result = sm
            .step(&Inputs {
                failed_pickup: true,
                ..Inputs::default()
            })
            .unwrap();
        assert_eq!(result.target, State::ErrorRetrieve);
        assert_eq!(result.label, "FPU>limit");
        assert_eq!(sm.context().failed_pickups, sm.failed_pickup_limit());
    }

    #[test]
    fn below_limit_failure_retries_alignment() {
        let mut sm = machine_in(State::Retrieving);
        sm.context.failed_pickups = sm.failed_pickup_limit() - 2;
        let result = sm
            .step(&Inputs {
                failed_pickup: true,
                ..Inputs::default()
            })
            .unwrap();
        assert_eq!(result.target, State::AlignForRetrieve);
        assert_eq!(result.label, "FPU");
    }

    #[test]
    fn pickup_success_beats_failure_in_retrieving() {
        let mut sm = machine_in(State::Retrieving);
        sm.context.failed_pickups = 10;
        let result = sm
            .step(&Inputs {
                failed_pickup: true,
                pick_up_success: true,
                ..Inputs::default()
            })
            .unwrap();
        assert_eq!(result.target, State::Retrieved);
        assert_eq!(sm.context().failed_pickups, 0);
    }

    #[test]
    fn failure_counter_moves_without_a_transition() {
        let mut sm = StateMachine::default();
        let fail = Inputs {
            failed_pickup: true,
            ..Inputs::default()
        };
        assert!(sm.step(&fail).is_none());
        assert!(sm.step(&fail).is_none());
        assert_eq!(sm.context().failed_pickups, 2);
        assert_eq!(sm.context().transition_count, 0);
    }

    #[test]
    fn align_for_place_failure_goes_to_error_place() {
        let mut sm = machine_in(State::AlignForPlace);
        let result = sm
            .step(&Inputs {
                failed_pickup: true,
                ..Inputs::default()
            })
            .unwrap();
        assert_eq!((result.target, result.label), (State::ErrorPlace, "FPU"));
    }

    #[test]
    fn error_states_recover() {
        let mut sm = machine_in(State::ErrorRetrieve);
        let r = sm
            .step(&Inputs {
                lego_detected: true,
                at_home: true,
                ..Inputs::default()
            })
            .unwrap();
        assert_eq!((r.target, r.label), (State::Searching, "LD"));

        let mut sm = machine_in(State::ErrorRetrieve);
        let r = sm.step(&Inputs { at_home: true, ..Inputs::default() }).unwrap();
        assert_eq!((r.target, r.label), (State::ReturnHome, "AH"));

        let mut sm = machine_in(State::ErrorPlace);
        let r = sm
            .step(&Inputs {
                safe_zone_detected: true,
                ..Inputs::default()
            })
            .unwrap();
        assert_eq!((r.target, r.label), (State::AlignForPlace, "SZD"));

        let mut sm = machine_in(State::ErrorPlace);
        let r = sm.step(&Inputs { at_home: true, ..Inputs::default() }).unwrap();
        assert_eq!((r.target, r.label), (State::ReturnHome, "AH"));
    }

    #[test]
    fn find_target_accepts_alignment_alone() {
        let mut sm = machine_in(State::FindTarget);
        let r = sm
            .step(&Inputs {
                aligned_for_retrieve: true,
                ..Inputs::default()
            })
            .unwrap();
        assert_eq!(r.target, State::AlignForRetrieve);
    }

    proptest! {
        #[test]
        fn end_is_absorbing(inputs in inputs_strategy()) {
            let mut sm = machine_in(State::End);
            prop_assert!(sm.step(&inputs).is_none());
            prop_assert_eq!(sm.state(), State::End);
            prop_assert_eq!(sm.context().transition_count, 0);
        }

        #[test]
        fn failure_counter_law(
            state in state_strategy(),
            before in 0u32..10,
            inputs in inputs_strategy(),
        ) {
            let mut sm = machine_in(state);
            sm.context.failed_pickups = before;
            sm.step(&inputs);

            let mut expected = if inputs.failed_pickup { before + 1 } else { before };
            if inputs.pick_up_success || inputs.place_success {
                expected = 0;
            }
            prop_assert_eq!(sm.context().failed_pickups, expected);
        }

        #[test]
        fn transition_count_tracks_results(
            state in state_strategy(),
            inputs in inputs_strategy(),
        ) {
            let mut sm = machine_in(state);
            match sm.step(&inputs) {
                Some(r) => {
                    prop_assert_eq!(r.source, state);
                    prop_assert_eq!(sm.state(), r.target);
                    prop_assert_eq!(sm.context().transition_count, 1);
                }
                None => {
                    prop_assert_eq!(sm.state(), state);
                    prop_assert_eq!(sm.context().transition_count, 0);
                }
            }
        }
    }
}
