use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::watch;
use tracing::debug;

use crate::types::{SimResult, SimulationState, SimulatorError};

/// 시뮬레이션 상태 머신
///
/// 상태 읽기는 atomic load, 전이는 compare-and-swap 입니다. CAS 는 watch 채널의 쓰기
/// 잠금 안에서 수행되므로 발행 순서가 전이 순서와 같고, 마지막으로 발행된 값은 항상
/// 현재 상태입니다. 틱 루프는 이 채널을 일시정지 조건으로 사용합니다.
#[derive(Debug)]
pub struct StateMachine {
    state: AtomicU8,
    publisher: watch::Sender<SimulationState>,
}

impl StateMachine {
    pub fn new() -> Self {
        let (publisher, _) = watch::channel(SimulationState::Initializing);
        Self {
            state: AtomicU8::new(SimulationState::Initializing as u8),
            publisher,
        }
    }

    pub fn current(&self) -> SimulationState {
        SimulationState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn subscribe(&self) -> watch::Receiver<SimulationState> {
        self.publisher.subscribe()
    }

    pub fn is_allowed(from: SimulationState, to: SimulationState) -> bool {
        use SimulationState::*;
        matches!(
            (from, to),
            (Initializing, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Stopping)
                | (Paused, Stopping)
                | (Stopping, Stopped)
                | (Stopped, Initializing)
                | (Error, Initializing)
        ) || (to == Error && from != Error)
    }

    /// `from` 상태일 때만 `to`로 전이
    pub fn transition(&self, from: SimulationState, to: SimulationState) -> SimResult<()> {
        if !Self::is_allowed(from, to) {
            return Err(SimulatorError::InvalidTransition { from, to });
        }
        let mut outcome = Ok(());
        self.publisher.send_if_modified(|published| {
            match self
                .state
                .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => {
                    *published = to;
                    true
                }
                Err(actual) => {
                    outcome = Err(SimulatorError::InvalidTransition {
                        from: SimulationState::from_u8(actual),
                        to,
                    });
                    false
                }
            }
        });
        outcome?;
        debug!("🔀 상태 전이: {} -> {}", from, to);
        Ok(())
    }

    /// 허용된 출발 상태 중 현재 상태에서 전이, 성공 시 출발 상태 반환
    pub fn transition_from(&self, allowed: &[SimulationState], to: SimulationState) -> SimResult<SimulationState> {
        for &from in allowed {
            if self.transition(from, to).is_ok() {
                return Ok(from);
            }
        }
        Err(SimulatorError::InvalidTransition { from: self.current(), to })
    }

    /// 치명적 오류: 어느 상태에서든 Error 로
    pub fn fail(&self) -> SimulationState {
        let mut previous = SimulationState::Error;
        self.publisher.send_if_modified(|published| {
            previous = SimulationState::from_u8(self.state.swap(SimulationState::Error as u8, Ordering::SeqCst));
            *published = SimulationState::Error;
            previous != SimulationState::Error
        });
        if previous != SimulationState::Error {
            debug!("🔀 상태 전이: {} -> Error", previous);
        }
        previous
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SimulationState::*;

    #[test]
    fn test_lifecycle_transitions() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), Initializing);

        sm.transition(Initializing, Running).unwrap();
        sm.transition(Running, Paused).unwrap();
        sm.transition(Paused, Running).unwrap();
        assert_eq!(sm.transition_from(&[Running, Paused], Stopping).unwrap(), Running);
        sm.transition(Stopping, Stopped).unwrap();
        sm.transition(Stopped, Initializing).unwrap();
        assert_eq!(sm.current(), Initializing);
    }

    #[test]
    fn test_rejected_transitions_leave_state() {
        let sm = StateMachine::new();
        assert!(sm.transition(Initializing, Paused).is_err());
        assert!(sm.transition(Running, Paused).is_err());
        assert!(sm.transition(Initializing, Stopped).is_err());
        assert_eq!(sm.current(), Initializing);

        // 출발 상태가 현재 상태와 다르면 CAS 실패
        match sm.transition(Paused, Running) {
            Err(SimulatorError::InvalidTransition { from, to }) => {
                assert_eq!(from, Initializing);
                assert_eq!(to, Running);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_error_only_exits_to_initializing() {
        let sm = StateMachine::new();
        sm.transition(Initializing, Running).unwrap();
        assert_eq!(sm.fail(), Running);
        assert_eq!(sm.current(), Error);

        assert!(sm.transition(Error, Running).is_err());
        assert!(sm.transition(Error, Stopped).is_err());
        sm.transition(Error, Initializing).unwrap();
    }

    #[tokio::test]
    async fn test_transitions_are_published() {
        let sm = StateMachine::new();
        let mut rx = sm.subscribe();
        sm.transition(Initializing, Running).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Running);
    }

    #[test]
    fn test_published_state_matches_current_under_contention() {
        use std::sync::Arc;

        for _ in 0..50 {
            let sm = Arc::new(StateMachine::new());
            sm.transition(Initializing, Running).unwrap();

            let toggler = {
                let sm = Arc::clone(&sm);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let _ = sm.transition(Running, Paused);
                        let _ = sm.transition(Paused, Running);
                    }
                })
            };
            let failer = {
                let sm = Arc::clone(&sm);
                std::thread::spawn(move || {
                    std::thread::yield_now();
                    sm.fail()
                })
            };
            toggler.join().unwrap();
            failer.join().unwrap();

            assert_eq!(sm.current(), Error);
            assert_eq!(*sm.subscribe().borrow(), Error);
        }
    }

    #[tokio::test]
    async fn test_fail_wakes_paused_waiter() {
        let sm = StateMachine::new();
        sm.transition(Initializing, Running).unwrap();
        let mut rx = sm.subscribe();
        sm.transition(Running, Paused).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Paused);

        assert_eq!(sm.fail(), Paused);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Error);
        // 이미 Error 이면 다시 발행하지 않음
        assert_eq!(sm.fail(), Error);
        assert!(!rx.has_changed().unwrap());
    }
}
