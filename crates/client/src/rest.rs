//! Ticket REST API collaborator
//!
//! The core consumes this as an abstract contract; the HTTP implementation
//! lives behind the same trait so tests can substitute a scripted one.
//! Every call carries the bearer credential. Failures surface as
//! [`SyncError::RequestFailed`] with a human-readable reason and leave
//! model state untouched.

use async_trait::async_trait;
use deskline_protocol::{ChatMessage, Ticket};
use serde::Deserialize;
use serde::Serialize;

use crate::error::SyncError;

#[async_trait]
pub trait TicketApi: Send + Sync {
    async fn list_tickets(&self) -> Result<Vec<Ticket>, SyncError>;
    async fn list_messages(&self, ticket_id: &str) -> Result<Vec<ChatMessage>, SyncError>;
    async fn create_ticket(&self, title: &str, initial_message: &str) -> Result<Ticket, SyncError>;
    async fn close_ticket(&self, ticket_id: &str) -> Result<(), SyncError>;
}

pub struct HttpTicketApi {
    http: reqwest::Client,
    base_url: String,
    credential: String,
}

impl HttpTicketApi {
    pub fn new(base_url: impl Into<String>, credential: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            credential: credential.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_body<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> Result<T, SyncError> {
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::RequestFailed(format!(
                "{what}: server returned {status}"
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|err| SyncError::RequestFailed(format!("{what}: invalid response: {err}")))
    }
}

#[async_trait]
impl TicketApi for HttpTicketApi {
    async fn list_tickets(&self) -> Result<Vec<Ticket>, SyncError> {
        let response = self
            .http
            .get(self.url("/tickets"))
            .bearer_auth(&self.credential)
            .send()
            .await
            .map_err(|err| SyncError::RequestFailed(format!("list tickets: {err}")))?;
        let body: TicketsEnvelope = Self::read_body(response, "list tickets").await?;
        body.into_result()
    }

    async fn list_messages(&self, ticket_id: &str) -> Result<Vec<ChatMessage>, SyncError> {
        let response = self
            .http
            .get(self.url(&format!("/tickets/{ticket_id}/messages")))
            .bearer_auth(&self.credential)
            .send()
            .await
            .map_err(|err| SyncError::RequestFailed(format!("list messages: {err}")))?;
        let body: MessagesEnvelope = Self::read_body(response, "list messages").await?;
        body.into_result()
    }

    async fn create_ticket(&self, title: &str, initial_message: &str) -> Result<Ticket, SyncError> {
        let response = self
            .http
            .post(self.url("/tickets"))
            .bearer_auth(&self.credential)
            .json(&CreateTicketBody {
                title,
                initial_message,
            })
            .send()
            .await
            .map_err(|err| SyncError::RequestFailed(format!("create ticket: {err}")))?;
        let body: TicketEnvelope = Self::read_body(response, "create ticket").await?;
        body.into_result()
    }

    async fn close_ticket(&self, ticket_id: &str) -> Result<(), SyncError> {
        let response = self
            .http
            .delete(self.url(&format!("/tickets/{ticket_id}/close")))
            .bearer_auth(&self.credential)
            .send()
            .await
            .map_err(|err| SyncError::RequestFailed(format!("close ticket: {err}")))?;
        let body: StatusEnvelope = Self::read_body(response, "close ticket").await?;
        body.into_result()
    }
}

#[derive(Serialize)]
struct CreateTicketBody<'a> {
    title: &'a str,
    initial_message: &'a str,
}

fn reason(error: Option<String>) -> String {
    error.unwrap_or_else(|| "server reported failure".to_string())
}

#[derive(Deserialize)]
struct TicketsEnvelope {
    success: bool,
    #[serde(default)]
    tickets: Vec<Ticket>,
    #[serde(default)]
    error: Option<String>,
}

impl TicketsEnvelope {
    fn into_result(self) -> Result<Vec<Ticket>, SyncError> {
        if self.success {
            Ok(self.tickets)
        } else {
            Err(SyncError::RequestFailed(reason(self.error)))
        }
    }
}

// The messages endpoint predates the success envelope; a body with just
// `messages` is treated as success.
#[derive(Deserialize)]
struct MessagesEnvelope {
    #[serde(default = "default_true")]
    success: bool,
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    error: Option<String>,
}

impl MessagesEnvelope {
    fn into_result(self) -> Result<Vec<ChatMessage>, SyncError> {
        if self.success {
            Ok(self.messages)
        } else {
            Err(SyncError::RequestFailed(reason(self.error)))
        }
    }
}

#[derive(Deserialize)]
struct TicketEnvelope {
    success: bool,
    #[serde(default)]
    ticket: Option<Ticket>,
    #[serde(default)]
    error: Option<String>,
}

impl TicketEnvelope {
    fn into_result(self) -> Result<Ticket, SyncError> {
        if self.success {
            self.ticket.ok_or_else(|| {
                SyncError::RequestFailed("create ticket: response had no ticket".to_string())
            })
        } else {
            Err(SyncError::RequestFailed(reason(self.error)))
        }
    }
}

#[derive(Deserialize)]
struct StatusEnvelope {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

impl StatusEnvelope {
    fn into_result(self) -> Result<(), SyncError> {
        if self.success {
            Ok(())
        } else {
            Err(SyncError::RequestFailed(reason(self.error)))
        }
    }
}

fn default_true() -> bool {
    true
}
