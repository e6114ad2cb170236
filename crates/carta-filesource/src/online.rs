use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use carta_net::Net;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use url::Url;

use crate::{
    error::{FileSourceError, FileSourceResult},
    request::{AsyncRequest, ResponseSender},
    resource::{Resource, ResourcePriority},
    response::Response,
    source::{properties, FileSource, PropertyValue},
};

/// Default cap on concurrently running network fetches.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 20;

/// Async hook rewriting a resource before it hits the network. A stalled
/// transform stalls only the request it is rewriting.
pub type ResourceTransform =
    Arc<dyn Fn(Resource) -> BoxFuture<'static, Resource> + Send + Sync>;

#[derive(Debug)]
struct Props {
    api_base_url: Option<Url>,
    access_token: Option<String>,
    max_concurrent: usize,
    online: bool,
}

impl Default for Props {
    fn default() -> Self {
        Self {
            api_base_url: None,
            access_token: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT_REQUESTS,
            online: true,
        }
    }
}

/// Network-backed file source with bounded concurrency.
///
/// Cheap to clone; all clones feed one background dispatcher task.
/// Requests beyond the concurrency cap queue in two FIFO tiers, all
/// [`ResourcePriority::Regular`] work ahead of any
/// [`ResourcePriority::Low`] work.
#[derive(Clone)]
pub struct OnlineFileSource {
    cmd_tx: mpsc::UnboundedSender<Command>,
    props: Arc<Mutex<Props>>,
}

enum Command {
    Request {
        resource: Resource,
        sender: ResponseSender,
    },
    Pause,
    Resume,
    SetTransform(Option<ResourceTransform>),
    /// Sent by a fetch task when it finishes, freeing its slot.
    Completed,
    /// Sent after property writes so dispatch re-reads them.
    Poke,
}

impl OnlineFileSource {
    /// Spawn the dispatcher onto the current tokio runtime.
    pub fn new(net: Arc<dyn Net>) -> Self {
        let props = Arc::new(Mutex::new(Props::default()));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let actor = Dispatcher {
            net,
            props: props.clone(),
            cmd_rx,
            self_tx: cmd_tx.clone(),
            queue: PendingQueue::default(),
            in_flight: 0,
            paused: false,
            transform: None,
        };
        tokio::spawn(actor.run());

        Self { cmd_tx, props }
    }

    /// Install or clear the resource transform applied before fetching.
    pub fn set_resource_transform(&self, transform: Option<ResourceTransform>) {
        let _ = self.cmd_tx.send(Command::SetTransform(transform));
    }

    fn props(&self) -> MutexGuard<'_, Props> {
        self.props.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn poke(&self) {
        let _ = self.cmd_tx.send(Command::Poke);
    }
}

impl FileSource for OnlineFileSource {
    fn request(&self, resource: Resource) -> AsyncRequest {
        let (request, sender) = AsyncRequest::channel();
        // A closed channel means the runtime is gone; the dropped sender
        // resolves the handle as Shutdown.
        let _ = self.cmd_tx.send(Command::Request { resource, sender });
        request
    }

    fn can_request(&self, resource: &Resource) -> bool {
        matches!(resource.url.scheme(), "http" | "https" | "carta")
    }

    fn pause(&self) {
        let _ = self.cmd_tx.send(Command::Pause);
    }

    fn resume(&self) {
        let _ = self.cmd_tx.send(Command::Resume);
    }

    fn set_property(&self, name: &str, value: PropertyValue) -> FileSourceResult<()> {
        match (name, value) {
            (properties::API_BASE_URL, PropertyValue::Str(s)) => {
                self.props().api_base_url = Url::parse(&s).ok();
            }
            (properties::ACCESS_TOKEN, PropertyValue::Str(s)) => {
                self.props().access_token = Some(s);
            }
            (properties::MAX_CONCURRENT_REQUESTS, PropertyValue::U64(n)) => {
                self.props().max_concurrent = n as usize;
            }
            (properties::ONLINE, PropertyValue::Bool(online)) => {
                self.props().online = online;
            }
            (name, _) => return Err(FileSourceError::UnknownProperty(name.to_string())),
        }
        self.poke();
        Ok(())
    }

    fn get_property(&self, name: &str) -> Option<PropertyValue> {
        let props = self.props();
        match name {
            properties::API_BASE_URL => props
                .api_base_url
                .as_ref()
                .map(|u| PropertyValue::Str(u.to_string())),
            properties::ACCESS_TOKEN => props
                .access_token
                .clone()
                .map(PropertyValue::Str),
            properties::MAX_CONCURRENT_REQUESTS => {
                Some(PropertyValue::U64(props.max_concurrent as u64))
            }
            properties::ONLINE => Some(PropertyValue::Bool(props.online)),
            _ => None,
        }
    }
}

struct Pending {
    resource: Resource,
    sender: ResponseSender,
}

/// Two-tier FIFO queue: every [`ResourcePriority::Regular`] entry drains
/// ahead of any [`ResourcePriority::Low`] entry, arrival order within a
/// tier. The scheduling discipline lives entirely in this type.
#[derive(Default)]
struct PendingQueue {
    regular: VecDeque<Pending>,
    low: VecDeque<Pending>,
}

impl PendingQueue {
    fn push(&mut self, pending: Pending) {
        match pending.resource.priority {
            ResourcePriority::Regular => self.regular.push_back(pending),
            ResourcePriority::Low => self.low.push_back(pending),
        }
    }

    fn pop(&mut self) -> Option<Pending> {
        self.regular.pop_front().or_else(|| self.low.pop_front())
    }
}

struct Dispatcher {
    net: Arc<dyn Net>,
    props: Arc<Mutex<Props>>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    self_tx: mpsc::UnboundedSender<Command>,
    queue: PendingQueue,
    in_flight: usize,
    paused: bool,
    transform: Option<ResourceTransform>,
}

impl Dispatcher {
    async fn run(mut self) {
        trace!("online dispatcher started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Command::Request { resource, sender } => {
                    trace!(url = %resource.url, priority = ?resource.priority, "request queued");
                    self.queue.push(Pending { resource, sender });
                }
                Command::Pause => {
                    debug!("online dispatch paused");
                    self.paused = true;
                }
                Command::Resume => {
                    debug!("online dispatch resumed");
                    self.paused = false;
                }
                Command::SetTransform(transform) => self.transform = transform,
                Command::Completed => self.in_flight = self.in_flight.saturating_sub(1),
                Command::Poke => {}
            }
            self.dispatch();
        }

        trace!("online dispatcher stopped");
    }

    /// Start queued work while slots are free. Cancelled entries are
    /// discarded here without consuming a slot; offline answers are
    /// immediate and also slot-free.
    fn dispatch(&mut self) {
        if self.paused {
            return;
        }

        loop {
            let (max, online) = {
                let props = self.props.lock().unwrap_or_else(|e| e.into_inner());
                (props.max_concurrent, props.online)
            };
            if self.in_flight >= max {
                return;
            }

            let Some(pending) = self.queue.pop() else {
                return;
            };
            if pending.sender.is_cancelled() {
                trace!(url = %pending.resource.url, "dropping cancelled request");
                continue;
            }
            if !online {
                pending.sender.send(Err(FileSourceError::Offline));
                continue;
            }

            self.spawn_fetch(pending);
        }
    }

    fn spawn_fetch(&mut self, pending: Pending) {
        self.in_flight += 1;

        let net = self.net.clone();
        let transform = self.transform.clone();
        let (base, token) = {
            let props = self.props.lock().unwrap_or_else(|e| e.into_inner());
            (props.api_base_url.clone(), props.access_token.clone())
        };
        let self_tx = self.self_tx.clone();

        tokio::spawn(async move {
            let Pending { resource, sender } = pending;

            let resource = match &transform {
                Some(transform) => transform(resource).await,
                None => resource,
            };
            let url = complete_url(&resource.url, base.as_ref(), token.as_deref());

            let cancelled = sender.token().clone();
            tokio::select! {
                _ = cancelled.cancelled() => {
                    trace!(%url, "fetch cancelled in flight");
                }
                result = net.fetch(url.clone(), None) => {
                    let result: FileSourceResult<Response> = result
                        .map(Response::from_http)
                        .map_err(FileSourceError::from);
                    sender.send(result);
                }
            }

            let _ = self_tx.send(Command::Completed);
        });
    }
}

/// Rewrite `carta://` scheme URLs against the configured API base and
/// append the access token. Plain http(s) URLs pass through untouched.
fn complete_url(url: &Url, base: Option<&Url>, token: Option<&str>) -> Url {
    if url.scheme() != "carta" {
        return url.clone();
    }
    let Some(base) = base else {
        return url.clone();
    };

    let mut path = String::new();
    if let Some(host) = url.host_str() {
        path.push_str(host);
    }
    path.push_str(url.path());

    let mut completed = match base.join(&path) {
        Ok(joined) => joined,
        Err(_) => return url.clone(),
    };
    if let Some(token) = token {
        completed.query_pairs_mut().append_pair("access_token", token);
    }
    completed
}
