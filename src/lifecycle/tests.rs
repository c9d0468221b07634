//! Unit tests for lifecycle operations against a scripted control plane.

use std::time::Duration;

use rstest::rstest;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::client::ClientError;
use crate::model::{HostId, ImageId};
use crate::test_support::{ApiCall, ScriptedApi, vm, vm_not_found};

const INTERVAL: Duration = Duration::from_secs(5);

fn service(api: &ScriptedApi) -> LifecycleService<ScriptedApi> {
    LifecycleService::new(api.clone(), WaitPolicy::new(INTERVAL, Duration::from_secs(60)))
}

fn spec(name: &str) -> VmSpec {
    VmSpec::builder()
        .name(name)
        .memory_megabytes(1024)
        .cores(1)
        .vmi_id(ImageId::new(1))
        .root_volume_size_gigabytes(10)
        .build()
        .unwrap_or_else(|err| panic!("spec should build: {err}"))
}

fn assert_elapsed(started: Instant, expected: Duration) {
    let elapsed = started.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(50),
        "expected about {expected:?}, waited {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn create_returns_running_machine_after_two_polls() {
    let api = ScriptedApi::new();
    api.push_create(Ok(vm(7, VmStatus::Creating)));
    api.push_get_statuses(7, [VmStatus::Creating, VmStatus::Running, VmStatus::Running]);

    let started = Instant::now();
    let created = service(&api)
        .create(&spec("vm-7"), &CancellationToken::new())
        .await
        .unwrap_or_else(|err| panic!("create should converge: {err}"));

    assert_eq!(created.status, VmStatus::Running);
    assert_eq!(created.id, VmId::new(7));
    assert_elapsed(started, INTERVAL * 2);
    assert_eq!(api.get_count(), 3);
    assert_eq!(api.mutations(), vec![ApiCall::Create(String::from("vm-7"))]);
}

#[tokio::test(start_paused = true)]
async fn rejected_create_surfaces_body_without_waiting() {
    let api = ScriptedApi::new();
    let rejection = ClientError::Api {
        status: 422,
        body: String::from("not enough memory on host"),
    };
    api.push_create(Err(rejection.clone()));

    let started = Instant::now();
    let err = service(&api)
        .create(&spec("web-1"), &CancellationToken::new())
        .await
        .err()
        .unwrap_or_else(|| panic!("create should fail"));

    assert_eq!(err.client_error(), Some(&rejection));
    assert!(err.to_string().contains("not enough memory on host"));
    assert!(err.to_string().contains("new vm 'web-1'"));
    assert_eq!(api.get_count(), 0);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn create_rejects_incomplete_spec_before_any_call() {
    let api = ScriptedApi::new();
    let mut invalid = spec("web-1");
    invalid.cores = 0;

    let err = service(&api)
        .create(&invalid, &CancellationToken::new())
        .await
        .err()
        .unwrap_or_else(|| panic!("create should fail"));

    assert!(matches!(
        err,
        LifecycleError::Validation {
            operation: Operation::Create,
            ..
        }
    ));
    assert!(api.calls().is_empty());
}

#[rstest]
#[case::start_running(PowerState::Running, VmStatus::Running)]
#[case::stop_stopped(PowerState::Stopped, VmStatus::Stopped)]
#[tokio::test(start_paused = true)]
async fn power_change_is_skipped_when_already_settled(
    #[case] state: PowerState,
    #[case] status: VmStatus,
) {
    let api = ScriptedApi::new();
    api.push_get(vm(3, status.clone()));

    let started = Instant::now();
    let snapshot = service(&api)
        .set_power_state(VmId::new(3), state, &CancellationToken::new())
        .await
        .unwrap_or_else(|err| panic!("settled vm should be returned: {err}"));

    assert_eq!(snapshot.status, status);
    assert_eq!(api.calls(), vec![ApiCall::Get(VmId::new(3))]);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn start_waits_for_running() {
    let api = ScriptedApi::new();
    api.push_get_statuses(
        4,
        [
            VmStatus::Stopped,
            VmStatus::Stopped,
            VmStatus::Running,
            VmStatus::Running,
        ],
    );

    let started = Instant::now();
    let snapshot = service(&api)
        .start(VmId::new(4), &CancellationToken::new())
        .await
        .unwrap_or_else(|err| panic!("start should converge: {err}"));

    assert_eq!(snapshot.status, VmStatus::Running);
    assert_elapsed(started, INTERVAL * 2);
    assert_eq!(api.mutations(), vec![ApiCall::Start(VmId::new(4))]);
}

#[tokio::test(start_paused = true)]
async fn set_power_state_stopped_issues_stop() {
    let api = ScriptedApi::new();
    api.push_get_statuses(5, [VmStatus::Running, VmStatus::Stopped, VmStatus::Stopped]);

    let snapshot = service(&api)
        .set_power_state(VmId::new(5), PowerState::Stopped, &CancellationToken::new())
        .await
        .unwrap_or_else(|err| panic!("stop should converge: {err}"));

    assert_eq!(snapshot.status, VmStatus::Stopped);
    assert_eq!(api.mutations(), vec![ApiCall::Stop(VmId::new(5))]);
}

#[tokio::test(start_paused = true)]
async fn update_settles_on_the_prior_status() {
    let api = ScriptedApi::new();
    api.push_get(vm(6, VmStatus::Stopped));
    api.push_update(Ok(vm(6, VmStatus::Updating)));
    api.push_get_statuses(
        6,
        [
            VmStatus::Updating,
            VmStatus::Running,
            VmStatus::Stopped,
            VmStatus::Stopped,
        ],
    );
    let update = VmUpdate {
        memory_megabytes: Some(2048),
        cores: None,
    };

    let started = Instant::now();
    let snapshot = service(&api)
        .update(VmId::new(6), &update, &CancellationToken::new())
        .await
        .unwrap_or_else(|err| panic!("update should converge: {err}"));

    assert_eq!(snapshot.status, VmStatus::Stopped);
    assert_elapsed(started, INTERVAL * 3);
    assert_eq!(api.mutations(), vec![ApiCall::Update(VmId::new(6), update)]);
}

#[tokio::test]
async fn update_rejects_zero_sizes_before_any_call() {
    let api = ScriptedApi::new();
    let update = VmUpdate {
        memory_megabytes: None,
        cores: Some(0),
    };

    let err = service(&api)
        .update(VmId::new(6), &update, &CancellationToken::new())
        .await
        .err()
        .unwrap_or_else(|| panic!("update should fail"));

    assert!(matches!(err, LifecycleError::Validation { .. }));
    assert!(api.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn reconcile_refuses_fixed_field_changes() {
    let api = ScriptedApi::new();
    api.push_get(vm(2, VmStatus::Running));
    let mut desired = spec("vm-2");
    desired.host_id = Some(HostId::new(9));

    let err = service(&api)
        .reconcile(VmId::new(2), &desired, &CancellationToken::new())
        .await
        .err()
        .unwrap_or_else(|| panic!("reconcile should fail"));

    assert_eq!(
        err,
        LifecycleError::ImmutableField {
            vm_id: VmId::new(2),
            field: "host_id",
        }
    );
    assert!(api.mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn reconcile_sends_mutable_fields_as_update() {
    let api = ScriptedApi::new();
    api.push_get(vm(2, VmStatus::Running));
    api.push_update(Ok(vm(2, VmStatus::Updating)));
    api.push_get_statuses(2, [VmStatus::Running, VmStatus::Running]);
    let mut desired = spec("vm-2");
    desired.memory_megabytes = 4096;
    desired.cores = 4;

    service(&api)
        .reconcile(VmId::new(2), &desired, &CancellationToken::new())
        .await
        .unwrap_or_else(|err| panic!("reconcile should converge: {err}"));

    assert_eq!(
        api.mutations(),
        vec![ApiCall::Update(
            VmId::new(2),
            VmUpdate {
                memory_megabytes: Some(4096),
                cores: Some(4),
            }
        )]
    );
}

#[tokio::test(start_paused = true)]
async fn delete_completes_when_machine_is_gone() {
    let api = ScriptedApi::new();
    api.push_get_statuses(8, [VmStatus::Deleting]);
    api.push_get_error(vm_not_found(8));

    let started = Instant::now();
    service(&api)
        .delete(VmId::new(8), &CancellationToken::new())
        .await
        .unwrap_or_else(|err| panic!("delete should converge: {err}"));

    assert_elapsed(started, INTERVAL * 2);
    assert_eq!(api.mutations(), vec![ApiCall::Delete(VmId::new(8))]);
    assert_eq!(api.get_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn wait_times_out_with_the_awaited_target() {
    let api = ScriptedApi::new();
    api.push_create(Ok(vm(9, VmStatus::Creating)));
    api.set_get_fallback(Ok(vm(9, VmStatus::Creating)));
    let timeout = Duration::from_secs(12);
    let service = LifecycleService::new(api.clone(), WaitPolicy::new(INTERVAL, timeout));

    let started = Instant::now();
    let err = service
        .create(&spec("vm-9"), &CancellationToken::new())
        .await
        .err()
        .unwrap_or_else(|| panic!("create should time out"));

    assert!(err.is_timeout());
    assert_eq!(
        err,
        LifecycleError::Timeout {
            operation: Operation::Create,
            vm_id: VmId::new(9),
            target: Target::Status(VmStatus::Running),
            waited: timeout,
        }
    );
    assert_elapsed(started, timeout);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_wait_reports_cancelled() {
    let api = ScriptedApi::new();
    api.push_get(vm(10, VmStatus::Stopped));
    api.set_get_fallback(Ok(vm(10, VmStatus::Stopped)));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        sleep(INTERVAL + INTERVAL / 2).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = service(&api)
        .start(VmId::new(10), &cancel)
        .await
        .err()
        .unwrap_or_else(|| panic!("start should be cancelled"));

    assert!(matches!(err, LifecycleError::Cancelled { .. }));
    assert!(!err.is_timeout());
    assert!(started.elapsed() < INTERVAL * 2);
    assert_eq!(api.mutations(), vec![ApiCall::Start(VmId::new(10))]);
}

#[tokio::test(start_paused = true)]
async fn cancelled_token_prevents_the_mutating_call() {
    let api = ScriptedApi::new();
    api.push_get(vm(11, VmStatus::Running));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = service(&api)
        .stop(VmId::new(11), &cancel)
        .await
        .err()
        .unwrap_or_else(|| panic!("stop should be aborted"));

    assert!(matches!(err, LifecycleError::Aborted { .. }));
    assert!(err.is_cancelled());
    assert!(api.mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_during_wait_is_a_request_error() {
    let api = ScriptedApi::new();
    api.push_get(vm(12, VmStatus::Stopped));
    let failure = ClientError::Api {
        status: 503,
        body: String::from("maintenance"),
    };
    api.push_get_error(failure.clone());

    let err = service(&api)
        .start(VmId::new(12), &CancellationToken::new())
        .await
        .err()
        .unwrap_or_else(|| panic!("start should fail"));

    assert_eq!(err.client_error(), Some(&failure));
    assert_eq!(api.get_count(), 2);
}

#[tokio::test]
async fn read_of_missing_machine_is_not_found() {
    let api = ScriptedApi::new();
    api.push_get_error(vm_not_found(13));

    let err = service(&api)
        .read(VmId::new(13), &CancellationToken::new())
        .await
        .err()
        .unwrap_or_else(|| panic!("read should fail"));

    assert!(err.client_error().is_some_and(ClientError::is_not_found));
}

#[rstest]
#[case(Operation::Create, None, Some(Target::Status(VmStatus::Running)))]
#[case(Operation::Start, None, Some(Target::Status(VmStatus::Running)))]
#[case(Operation::Stop, None, Some(Target::Status(VmStatus::Stopped)))]
#[case(Operation::Delete, None, Some(Target::Deleted))]
#[case(
    Operation::Update,
    Some(VmStatus::Stopped),
    Some(Target::Status(VmStatus::Stopped))
)]
#[case(Operation::Read, None, None)]
fn convergence_targets(
    #[case] operation: Operation,
    #[case] prior: Option<VmStatus>,
    #[case] expected: Option<Target>,
) {
    assert_eq!(operation.convergence_target(prior.as_ref()), expected);
}

/// Scripts a machine that never leaves its transitional status, then runs
/// `operation` against it.
async fn run_stuck(
    api: &ScriptedApi,
    service: &LifecycleService<ScriptedApi>,
    operation: Operation,
    cancel: &CancellationToken,
) -> Result<(), LifecycleError> {
    let id = VmId::new(20);
    match operation {
        Operation::Update => {
            api.push_get(vm(20, VmStatus::Stopped));
            api.push_update(Ok(vm(20, VmStatus::Updating)));
            api.set_get_fallback(Ok(vm(20, VmStatus::Updating)));
            let update = VmUpdate {
                memory_megabytes: None,
                cores: Some(2),
            };
            service.update(id, &update, cancel).await.map(drop)
        }
        Operation::Stop => {
            api.set_get_fallback(Ok(vm(20, VmStatus::Running)));
            service.stop(id, cancel).await.map(drop)
        }
        Operation::Start => {
            api.set_get_fallback(Ok(vm(20, VmStatus::Stopped)));
            service.start(id, cancel).await.map(drop)
        }
        Operation::Delete => {
            api.set_get_fallback(Ok(vm(20, VmStatus::Deleting)));
            service.delete(id, cancel).await
        }
        Operation::Create | Operation::Read => panic!("{operation} is not scripted here"),
    }
}

#[rstest]
#[case::update(Operation::Update, Target::Status(VmStatus::Stopped), "become stopped")]
#[case::stop(Operation::Stop, Target::Status(VmStatus::Stopped), "become stopped")]
#[case::start(Operation::Start, Target::Status(VmStatus::Running), "become running")]
#[case::delete(Operation::Delete, Target::Deleted, "become deleted")]
#[tokio::test(start_paused = true)]
async fn every_waiting_operation_times_out(
    #[case] operation: Operation,
    #[case] target: Target,
    #[case] wording: &str,
) {
    let api = ScriptedApi::new();
    let timeout = Duration::from_secs(12);
    let service = LifecycleService::new(api.clone(), WaitPolicy::new(INTERVAL, timeout));

    let started = Instant::now();
    let err = run_stuck(&api, &service, operation, &CancellationToken::new())
        .await
        .err()
        .unwrap_or_else(|| panic!("{operation} should time out"));

    assert_eq!(
        err,
        LifecycleError::Timeout {
            operation,
            vm_id: VmId::new(20),
            target,
            waited: timeout,
        }
    );
    assert!(err.to_string().contains(wording), "message: {err}");
    assert_elapsed(started, timeout);
    assert_eq!(api.mutations().len(), 1);
}

#[rstest]
#[case::update(Operation::Update, Target::Status(VmStatus::Stopped))]
#[case::delete(Operation::Delete, Target::Deleted)]
#[tokio::test(start_paused = true)]
async fn cancelling_a_wait_keeps_the_issued_call(
    #[case] operation: Operation,
    #[case] target: Target,
) {
    let api = ScriptedApi::new();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        sleep(INTERVAL + INTERVAL / 2).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = run_stuck(&api, &service(&api), operation, &cancel)
        .await
        .err()
        .unwrap_or_else(|| panic!("{operation} should be cancelled"));

    assert_eq!(
        err,
        LifecycleError::Cancelled {
            operation,
            vm_id: VmId::new(20),
            target,
        }
    );
    assert!(started.elapsed() < INTERVAL * 2);
    assert_eq!(api.mutations().len(), 1);
}

#[rstest]
#[case(PowerState::Running, Operation::Start, VmStatus::Running)]
#[case(PowerState::Stopped, Operation::Stop, VmStatus::Stopped)]
fn power_states_map_to_their_operation(
    #[case] state: PowerState,
    #[case] operation: Operation,
    #[case] status: VmStatus,
) {
    assert_eq!(state.operation(), operation);
    assert_eq!(state.status(), status);
}

#[tokio::test(start_paused = true)]
async fn stopping_issues_stop_and_never_start() {
    let api = ScriptedApi::new();
    api.push_get_statuses(21, [VmStatus::Running, VmStatus::Stopped, VmStatus::Stopped]);

    service(&api)
        .stop(VmId::new(21), &CancellationToken::new())
        .await
        .unwrap_or_else(|err| panic!("stop should converge: {err}"));

    assert_eq!(api.mutations(), vec![ApiCall::Stop(VmId::new(21))]);
}
