//! [`AudioServer`] implementation over a [`Transport`].
//!
//! Every reply-bearing call registers a pending request with the
//! [`Scheduler`], frames the request with that id and hands it to the
//! transport. The matching reply is decoded on the main thread when the
//! scheduler drains. A request the transport refuses is failed right away
//! with [`Failure::ServerUnreachable`].

use patchcord_core::{
    AudioServer, BusId, Deferred, ExecToken, Failure, GroupId, InstanceId, OutletPlaceholder,
    Scheduler,
};

use crate::protocol::{Outgoing, ServerReply, ServerRequest, WireOutlet, WireToken, wire_buses};
use crate::transport::Transport;

/// Bridge between the graph engine and a server connection.
pub struct ServerBridge<T> {
    transport: T,
    scheduler: Scheduler<ServerReply>,
}

impl<T: Transport> ServerBridge<T> {
    /// Creates a bridge that correlates replies through `scheduler`.
    pub fn new(transport: T, scheduler: Scheduler<ServerReply>) -> Self {
        Self {
            transport,
            scheduler,
        }
    }

    /// Scheduler this bridge registers requests with.
    pub fn scheduler(&self) -> &Scheduler<ServerReply> {
        &self.scheduler
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolves once the server has processed every request sent before it.
    pub fn sync(&self) -> Deferred<()> {
        self.request(ServerRequest::Sync, expect_done)
    }

    fn request<V: 'static>(
        &self,
        request: ServerRequest,
        decode: impl FnOnce(ServerReply) -> Result<V, Failure> + 'static,
    ) -> Deferred<V> {
        let (id, deferred) = self.scheduler.register(decode);
        if !self.scheduler.is_open() {
            return deferred;
        }
        let message = Outgoing {
            id: Some(id.0),
            request,
        };
        if let Err(err) = self.transport.send(message) {
            tracing::warn!(request = %id, error = %err, "bridge_request: send failed");
            self.scheduler
                .reject(id, Failure::ServerUnreachable(err.to_string()));
        }
        deferred
    }

    fn notify(&self, request: ServerRequest) {
        if let Err(err) = self.transport.send(Outgoing { id: None, request }) {
            tracing::warn!(error = %err, "bridge_notify: send failed");
        }
    }
}

impl<T: Transport> AudioServer for ServerBridge<T> {
    fn allocate_bus(&self) -> Deferred<BusId> {
        self.request(ServerRequest::AllocBus, |reply| match reply {
            ServerReply::Bus { bus } => Ok(BusId(bus)),
            ServerReply::Refused { reason } => Err(Failure::BusAllocationFailed(reason)),
            other => Err(unexpected(&other)),
        })
    }

    fn allocate_instance(
        &self,
        template_full_id: &str,
        outlets: &[OutletPlaceholder],
    ) -> Deferred<InstanceId> {
        let template = template_full_id.to_string();
        let request = ServerRequest::NewInstance {
            def: template.clone(),
            outlets: outlets.iter().map(WireOutlet::from).collect(),
        };
        self.request(request, move |reply| match reply {
            ServerReply::Instance { node } => Ok(InstanceId(node)),
            ServerReply::Refused { reason } => {
                Err(Failure::InstanceCreationFailed { template, reason })
            }
            other => Err(unexpected(&other)),
        })
    }

    fn allocate_group(&self) -> Deferred<GroupId> {
        self.request(ServerRequest::NewGroup, |reply| match reply {
            ServerReply::Group { group } => Ok(GroupId(group)),
            other => Err(unexpected(&other)),
        })
    }

    fn bind_inlet(&self, instance: InstanceId, inlet: &str, bus: BusId) {
        self.notify(ServerRequest::BindInlet {
            node: instance.0,
            inlet: inlet.to_string(),
            bus: bus.0,
        });
    }

    fn bind_outlet_fanout(&self, instance: InstanceId, outlet: &str, buses: &[BusId]) {
        self.notify(ServerRequest::BindOutlet {
            node: instance.0,
            outlet: outlet.to_string(),
            buses: wire_buses(buses),
        });
    }

    fn set_param(&self, instance: InstanceId, param: &str, value: f32) {
        self.notify(ServerRequest::SetParam {
            node: instance.0,
            param: param.to_string(),
            value,
        });
    }

    fn set_execution_order(&self, tokens: &[ExecToken]) {
        self.notify(ServerRequest::Order {
            tokens: tokens.iter().copied().map(WireToken::from).collect(),
        });
    }

    fn destroy_instance(&self, instance: InstanceId) -> Deferred<()> {
        self.request(ServerRequest::Free { node: instance.0 }, expect_done)
    }
}

fn expect_done(reply: ServerReply) -> Result<(), Failure> {
    match reply {
        ServerReply::Done => Ok(()),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(reply: &ServerReply) -> Failure {
    Failure::UnexpectedReply(format!("{reply:?}"))
}
