//! Container lifecycle FSM tests

use vespa_deployer::deploy::fsm::{ContainerEvent, ContainerFsm, ContainerState};

#[test]
fn test_fsm_initial_state() {
    let fsm = ContainerFsm::new();
    assert_eq!(fsm.state(), ContainerState::Absent);
    assert!(fsm.error().is_none());
    assert_eq!(fsm.restart_count(), 0);
}

#[test]
fn test_fsm_restart_flow() {
    let mut fsm = ContainerFsm::new();
    fsm.process(ContainerEvent::Create).unwrap();
    fsm.process(ContainerEvent::Started).unwrap();
    fsm.process(ContainerEvent::Ready).unwrap();

    // Ready -> Restarting -> AwaitingReadiness
    fsm.process(ContainerEvent::Restart).unwrap();
    assert_eq!(fsm.state(), ContainerState::Restarting);
    fsm.process(ContainerEvent::Started).unwrap();
    assert_eq!(fsm.state(), ContainerState::AwaitingReadiness);
    assert_eq!(fsm.restart_count(), 1);
}

#[test]
fn test_fsm_stop_and_start_services() {
    let mut fsm = ContainerFsm::new();
    fsm.process(ContainerEvent::Attach).unwrap();
    fsm.process(ContainerEvent::Ready).unwrap();

    fsm.process(ContainerEvent::Stop).unwrap();
    assert_eq!(fsm.state(), ContainerState::Stopped);

    fsm.process(ContainerEvent::Start).unwrap();
    assert_eq!(fsm.state(), ContainerState::AwaitingReadiness);
}

#[test]
fn test_fsm_timeout_then_recreate() {
    let mut fsm = ContainerFsm::new();
    fsm.process(ContainerEvent::Create).unwrap();
    fsm.process(ContainerEvent::Started).unwrap();
    fsm.process(ContainerEvent::Fail("config server timeout".to_string())).unwrap();
    assert_eq!(fsm.state(), ContainerState::Failed);
    assert_eq!(fsm.error(), Some("config server timeout"));

    fsm.process(ContainerEvent::Create).unwrap();
    assert_eq!(fsm.state(), ContainerState::Starting);
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_invalid_transitions() {
    let mut fsm = ContainerFsm::new();

    // Cannot become ready without a container
    assert!(fsm.process(ContainerEvent::Ready).is_err());
    assert!(fsm.process(ContainerEvent::Stop).is_err());
    assert!(fsm.process(ContainerEvent::Started).is_err());
    assert_eq!(fsm.state(), ContainerState::Absent);

    fsm.process(ContainerEvent::Create).unwrap();
    assert!(fsm.process(ContainerEvent::Create).is_err());
    assert!(fsm.process(ContainerEvent::Restart).is_err());
    assert_eq!(fsm.state(), ContainerState::Starting);
}
