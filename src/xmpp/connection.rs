// XMPP connection task for Parley
// Owns the tokio-xmpp client, feeds EngineEvents to the session and sends
// whatever the session queues on the outbound channel.

use anyhow::{anyhow, Result};
use futures_util::SinkExt; // For close() on AsyncClient
use futures_util::StreamExt; // For next() on AsyncClient
use log::{debug, error, info, warn};
use std::str::FromStr;
use tokio::sync::mpsc;
use tokio_xmpp::{AsyncClient as XMPPAsyncClient, BareJid as TokioBareJid, Event as XMPPEvent};
use uuid::Uuid;
use xmpp_parsers::Element;

use super::stanza::{self, Incoming};
use crate::address::Address;
use crate::engine::{EngineErrorKind, EngineEvent, Transport};
use crate::models::ChatState;

/// Fire-and-forget sender handed to the session. Dropping every clone
/// ends the connection.
#[derive(Debug, Clone)]
pub struct XmppTransport {
    outbound: mpsc::UnboundedSender<Element>,
}

impl XmppTransport {
    fn submit(&self, element: Element) {
        if self.outbound.send(element).is_err() {
            warn!("Connection task is gone, dropping outbound stanza");
        }
    }
}

impl Transport for XmppTransport {
    fn send_state_notification(&self, to: &Address, state: ChatState) {
        if let Some(element) = stanza::chat_state_message(to, state) {
            debug!("Queueing {} chat state for {}", state.label(), to);
            self.submit(element);
        }
    }

    fn send_message(&self, to: &Address, body: &str, rich_body: Option<&str>) {
        debug!("Queueing message for {}", to);
        self.submit(stanza::chat_message(to, body, rich_body));
    }
}

/// Start connecting as `jid`. Events arrive on the returned receiver,
/// beginning with `Connected` or an error.
pub fn connect(jid: &str, password: &str) -> Result<(XmppTransport, mpsc::Receiver<EngineEvent>)> {
    let tokio_jid = match TokioBareJid::from_str(jid) {
        Ok(jid) => {
            if jid.node_str().is_none() {
                let err = anyhow!("Invalid JID format: Missing username part in '{}'", jid);
                error!("{}", err);
                return Err(err);
            }
            jid
        }
        Err(e) => {
            error!("Failed to parse JID '{}': {}", jid, e);
            return Err(anyhow!("Invalid JID format: {}", e));
        }
    };
    let own_bare = Address::parse(jid)?.bare_str().to_string();

    info!("Connecting to XMPP server as {}", tokio_jid);
    let client = XMPPAsyncClient::new(tokio_jid, password.to_string());
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(100);
    tokio::spawn(run_client(client, own_bare, outbound_rx, event_tx));

    Ok((XmppTransport { outbound: outbound_tx }, event_rx))
}

enum Step {
    Inbound(Option<XMPPEvent>),
    Outbound(Option<Element>),
}

async fn run_client(
    mut client: XMPPAsyncClient,
    own_bare: String,
    mut outbound: mpsc::UnboundedReceiver<Element>,
    events: mpsc::Sender<EngineEvent>,
) {
    loop {
        let step = tokio::select! {
            event = client.next() => Step::Inbound(event),
            element = outbound.recv() => Step::Outbound(element),
        };

        match step {
            Step::Inbound(Some(XMPPEvent::Online { bound_jid, resumed })) => {
                info!("Connected to XMPP server as {} (resumed: {})", bound_jid, resumed);
                let bound = match Address::parse(&bound_jid.to_string()) {
                    Ok(bound) => bound,
                    Err(e) => {
                        error!("Server bound an unusable address: {}", e);
                        let _ = events.send(EngineEvent::Error(EngineErrorKind::Protocol)).await;
                        break;
                    }
                };
                if events.send(EngineEvent::Connected { bound }).await.is_err() {
                    break;
                }
                let request_id = Uuid::new_v4().to_string();
                for element in [stanza::roster_request(&request_id), stanza::initial_presence()] {
                    if let Err(e) = client.send_stanza(element).await {
                        error!("Failed to send post-login stanza: {}", e);
                    }
                }
            }
            Step::Inbound(Some(XMPPEvent::Stanza(element))) => {
                match stanza::classify(&element, Some(&own_bare)) {
                    Incoming::Event(event) => {
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    Incoming::RosterPush { id, entries } => {
                        if let Err(e) = client.send_stanza(stanza::roster_push_ack(&id)).await {
                            warn!("Failed to acknowledge roster push {}: {}", id, e);
                        }
                        for entry in entries {
                            if events.send(EngineEvent::RosterPushed(entry)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Incoming::Ignored => {}
                }
            }
            Step::Inbound(Some(XMPPEvent::Disconnected(reason))) => {
                let event = match reason {
                    tokio_xmpp::Error::Auth(e) => {
                        error!("Authentication failed - check username and password: {}", e);
                        EngineEvent::Error(EngineErrorKind::Authentication)
                    }
                    tokio_xmpp::Error::Io(io_err) => {
                        error!("Network error: {}", io_err);
                        EngineEvent::Error(EngineErrorKind::Network)
                    }
                    tokio_xmpp::Error::Tls(err) => {
                        error!("TLS error: {}", err);
                        EngineEvent::Error(EngineErrorKind::Tls)
                    }
                    tokio_xmpp::Error::Protocol(err) => {
                        error!("Protocol error: {}", err);
                        EngineEvent::Error(EngineErrorKind::Protocol)
                    }
                    other => {
                        warn!("XMPP client is disconnected: {:?}", other);
                        EngineEvent::Disconnected
                    }
                };
                let _ = events.send(event).await;
                break;
            }
            Step::Inbound(None) => {
                info!("XMPP connection closed");
                let _ = events.send(EngineEvent::Disconnected).await;
                break;
            }
            Step::Outbound(Some(element)) => {
                if let Err(e) = client.send_stanza(element).await {
                    error!("Failed to send stanza: {}", e);
                }
            }
            Step::Outbound(None) => {
                info!("Disconnecting from XMPP server");
                match client.send_stanza(stanza::unavailable_presence()).await {
                    Ok(_) => debug!("Sent unavailable presence"),
                    Err(e) => warn!("Failed to send unavailable presence: {}", e),
                }
                if let Err(e) = client.close().await {
                    error!("Error closing XMPP stream: {}", e);
                }
                let _ = events.send(EngineEvent::Disconnected).await;
                break;
            }
        }
    }
}
