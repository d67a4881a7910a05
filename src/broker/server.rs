// src/broker/server.rs

use super::message::{Envelope, Request, decode, encode};
use super::service::Broker;
use crate::core::{MeshError, MeshResult, RegisterHandle};
use crate::simulation::VirtualRegister;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Depth of a broker's request queue.
pub const REQUEST_QUEUE_DEPTH: usize = 64;

enum Control {
    Bind { register: VirtualRegister, root: RegisterHandle, done: oneshot::Sender<()> },
    Shutdown,
}

/// A broker running as its own task.
///
/// The task owns the broker and drains its request channel one envelope at a
/// time, so the register behind it is only ever mutated sequentially.
pub struct BrokerServer {
    node: String,
    control: mpsc::Sender<Control>,
    task: JoinHandle<Broker>,
}

impl BrokerServer {
    /// Starts serving `broker`; remote peers send envelopes on the returned sender.
    pub fn spawn(broker: Broker) -> (Self, mpsc::Sender<Envelope>) {
        let node = broker.node().to_string();
        let (calls_tx, calls_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let (control_tx, control_rx) = mpsc::channel(4);
        let task = tokio::spawn(serve(broker, calls_rx, control_rx));
        info!(node = %node, "Broker listening");
        (Self { node, control: control_tx, task }, calls_tx)
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Binds the running broker; calls already queued behind it see the register.
    pub async fn bind(&self, register: VirtualRegister, root: RegisterHandle) -> MeshResult<()> {
        let (done, bound) = oneshot::channel();
        self.control
            .send(Control::Bind { register, root, done })
            .await
            .map_err(|_| self.stopped())?;
        bound.await.map_err(|_| self.stopped())
    }

    /// Stops the task and returns the broker with whatever it was bound to.
    pub async fn shutdown(self) -> MeshResult<Broker> {
        // The task also stops when every request sender is gone.
        let _ = self.control.send(Control::Shutdown).await;
        self.task.await.map_err(|e| MeshError::Disconnected {
            node: self.node.clone(),
            message: format!("Broker task failed: {}", e),
        })
    }

    fn stopped(&self) -> MeshError {
        MeshError::Disconnected { node: self.node.clone(), message: "Broker task has stopped".to_string() }
    }
}

async fn serve(mut broker: Broker, mut calls: mpsc::Receiver<Envelope>, mut control: mpsc::Receiver<Control>) -> Broker {
    loop {
        tokio::select! {
            biased;
            Some(command) = control.recv() => match command {
                Control::Bind { register, root, done } => {
                    broker.bind(register, root);
                    let _ = done.send(());
                }
                Control::Shutdown => break,
            },
            envelope = calls.recv() => match envelope {
                Some(envelope) => handle_envelope(&mut broker, envelope).await,
                None => break,
            },
        }
    }
    info!(node = %broker.node(), "Broker stopped");
    broker
}

async fn handle_envelope(broker: &mut Broker, envelope: Envelope) {
    let result = match decode::<Request>(&envelope.frame) {
        Ok(request) => {
            debug!(node = %broker.node(), operation = request.name(), "Handling remote call");
            broker.handle(request).await
        }
        Err(e) => Err(e),
    };
    if let Err(e) = &result {
        debug!(node = %broker.node(), error = %e, "Remote call failed");
    }
    let frame = match encode(&result) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(node = %broker.node(), error = %e, "Dropping unencodable reply");
            return;
        }
    };
    if envelope.reply.send(frame).is_err() {
        warn!(node = %broker.node(), "Caller went away before the reply was sent");
    }
}
