//! Test support utilities shared across unit and integration tests.

use std::collections::VecDeque;
use std::env;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::client::{ApiFuture, ClientError, VmApi};
use crate::model::{
    Host, HostId, HostRef, Image, ImageId, ImageRef, RootVolume, VirtualMachine, VmId, VmStatus,
};
use crate::request::{VmSpec, VmUpdate};

/// Builds a snapshot with fixed sizes and the given status.
///
/// The machine has 1024 MiB of memory, one core, a 10 GiB root volume, and
/// sits on host 1 booted from image 1.
#[must_use]
pub fn vm(id: i64, status: VmStatus) -> VirtualMachine {
    VirtualMachine {
        id: VmId::new(id),
        name: format!("vm-{id}"),
        memory_bytes: 1024 << 20,
        cores: 1,
        status,
        host: Some(HostRef {
            id: HostId::new(1),
            name: String::from("host-1"),
        }),
        vmi: ImageRef {
            id: ImageId::new(1),
            name: String::from("image-1"),
        },
        root_volume: RootVolume {
            size_bytes: 10 << 30,
        },
    }
}

/// Builds a "not found" client error for a machine.
#[must_use]
pub fn vm_not_found(id: i64) -> ClientError {
    ClientError::NotFound {
        resource: String::from("vm"),
        id: id.to_string(),
    }
}

/// One call recorded by [`ScriptedApi`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ApiCall {
    /// `create_vm` with the requested name.
    Create(String),
    /// `get_vm`.
    Get(VmId),
    /// `update_vm` with its payload.
    Update(VmId, VmUpdate),
    /// `start_vm`.
    Start(VmId),
    /// `stop_vm`.
    Stop(VmId),
    /// `delete_vm`.
    Delete(VmId),
    /// `list_hosts`.
    ListHosts,
    /// `list_images`.
    ListImages,
}

impl ApiCall {
    /// Returns `true` for calls that change the machine.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Create(_) | Self::Update(..) | Self::Start(_) | Self::Stop(_) | Self::Delete(_)
        )
    }
}

#[derive(Debug, Default)]
struct Script {
    creates: VecDeque<Result<VirtualMachine, ClientError>>,
    gets: VecDeque<Result<VirtualMachine, ClientError>>,
    get_fallback: Option<Result<VirtualMachine, ClientError>>,
    updates: VecDeque<Result<VirtualMachine, ClientError>>,
    starts: VecDeque<Result<(), ClientError>>,
    stops: VecDeque<Result<(), ClientError>>,
    deletes: VecDeque<Result<(), ClientError>>,
    hosts: Vec<Host>,
    images: Vec<Image>,
    calls: Vec<ApiCall>,
}

fn unscripted(call: &str) -> ClientError {
    ClientError::Api {
        status: 500,
        body: format!("no scripted response for {call}"),
    }
}

/// Control-plane double that replays scripted responses in FIFO order and
/// records every call.
///
/// Clones share the same script, so a test can keep one handle for
/// assertions while the service under test owns another. Power and delete
/// calls succeed when nothing is scripted; reads repeat the fallback once
/// their queue is empty.
#[derive(Clone, Debug, Default)]
pub struct ScriptedApi {
    script: Arc<Mutex<Script>>,
}

impl ScriptedApi {
    /// Creates an API with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the result of the next `create_vm`.
    pub fn push_create(&self, result: Result<VirtualMachine, ClientError>) {
        self.script().creates.push_back(result);
    }

    /// Queues a snapshot for the next `get_vm`.
    pub fn push_get(&self, snapshot: VirtualMachine) {
        self.script().gets.push_back(Ok(snapshot));
    }

    /// Queues one snapshot per status for consecutive `get_vm` calls.
    pub fn push_get_statuses(&self, id: i64, statuses: impl IntoIterator<Item = VmStatus>) {
        let mut script = self.script();
        for status in statuses {
            script.gets.push_back(Ok(vm(id, status)));
        }
    }

    /// Queues a failure for the next `get_vm`.
    pub fn push_get_error(&self, error: ClientError) {
        self.script().gets.push_back(Err(error));
    }

    /// Sets the result returned by `get_vm` once its queue is exhausted.
    pub fn set_get_fallback(&self, result: Result<VirtualMachine, ClientError>) {
        self.script().get_fallback = Some(result);
    }

    /// Queues the result of the next `update_vm`.
    pub fn push_update(&self, result: Result<VirtualMachine, ClientError>) {
        self.script().updates.push_back(result);
    }

    /// Queues the result of the next `start_vm`.
    pub fn push_start(&self, result: Result<(), ClientError>) {
        self.script().starts.push_back(result);
    }

    /// Queues the result of the next `stop_vm`.
    pub fn push_stop(&self, result: Result<(), ClientError>) {
        self.script().stops.push_back(result);
    }

    /// Queues the result of the next `delete_vm`.
    pub fn push_delete(&self, result: Result<(), ClientError>) {
        self.script().deletes.push_back(result);
    }

    /// Sets the hosts returned by `list_hosts`.
    pub fn set_hosts(&self, hosts: Vec<Host>) {
        self.script().hosts = hosts;
    }

    /// Sets the images returned by `list_images`.
    pub fn set_images(&self, images: Vec<Image>) {
        self.script().images = images;
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.script().calls.clone()
    }

    /// Returns the recorded calls that change a machine.
    #[must_use]
    pub fn mutations(&self) -> Vec<ApiCall> {
        self.calls()
            .into_iter()
            .filter(ApiCall::is_mutation)
            .collect()
    }

    /// Counts recorded `get_vm` calls.
    #[must_use]
    pub fn get_count(&self) -> usize {
        self.script()
            .calls
            .iter()
            .filter(|call| matches!(call, ApiCall::Get(_)))
            .count()
    }
}

impl VmApi for ScriptedApi {
    fn create_vm<'a>(&'a self, spec: &'a VmSpec) -> ApiFuture<'a, VirtualMachine> {
        let mut script = self.script();
        script.calls.push(ApiCall::Create(spec.name.clone()));
        let result = script
            .creates
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("create_vm")));
        Box::pin(std::future::ready(result))
    }

    fn get_vm(&self, id: VmId) -> ApiFuture<'_, VirtualMachine> {
        let mut script = self.script();
        script.calls.push(ApiCall::Get(id));
        let result = match script.gets.pop_front() {
            Some(next) => next,
            None => script
                .get_fallback
                .clone()
                .unwrap_or_else(|| Err(unscripted("get_vm"))),
        };
        Box::pin(std::future::ready(result))
    }

    fn update_vm<'a>(&'a self, id: VmId, update: &'a VmUpdate) -> ApiFuture<'a, VirtualMachine> {
        let mut script = self.script();
        script.calls.push(ApiCall::Update(id, *update));
        let result = script
            .updates
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("update_vm")));
        Box::pin(std::future::ready(result))
    }

    fn start_vm(&self, id: VmId) -> ApiFuture<'_, ()> {
        let mut script = self.script();
        script.calls.push(ApiCall::Start(id));
        let result = script.starts.pop_front().unwrap_or(Ok(()));
        Box::pin(std::future::ready(result))
    }

    fn stop_vm(&self, id: VmId) -> ApiFuture<'_, ()> {
        let mut script = self.script();
        script.calls.push(ApiCall::Stop(id));
        let result = script.stops.pop_front().unwrap_or(Ok(()));
        Box::pin(std::future::ready(result))
    }

    fn delete_vm(&self, id: VmId) -> ApiFuture<'_, ()> {
        let mut script = self.script();
        script.calls.push(ApiCall::Delete(id));
        let result = script.deletes.pop_front().unwrap_or(Ok(()));
        Box::pin(std::future::ready(result))
    }

    fn list_hosts(&self) -> ApiFuture<'_, Vec<Host>> {
        let mut script = self.script();
        script.calls.push(ApiCall::ListHosts);
        Box::pin(std::future::ready(Ok(script.hosts.clone())))
    }

    fn list_images(&self) -> ApiFuture<'_, Vec<Image>> {
        let mut script = self.script();
        script.calls.push(ApiCall::ListImages);
        Box::pin(std::future::ready(Ok(script.images.clone())))
    }
}

static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds a global env mutex and removes the variables it set on
/// drop.
#[derive(Debug)]
pub struct EnvGuard {
    keys: Vec<String>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets environment variables while holding the global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        let guard = ENV_LOCK.lock().await;
        for (key, value) in pairs {
            // SAFETY: the global lock serialises environment mutation between tests.
            unsafe { env::set_var(key, value) };
        }
        Self {
            keys: pairs.iter().map(|(key, _)| (*key).to_owned()).collect(),
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in &self.keys {
            // SAFETY: still holding the global lock acquired in `set_vars`.
            unsafe { env::remove_var(key) };
        }
    }
}
