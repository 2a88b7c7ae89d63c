use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::CalendarConfig;

#[derive(Debug)]
pub enum CalendarError {
    /// No calendar id or token configured. Only calendar actions fail.
    NotConfigured,
    Validation(String),
    Http(String),
    Api { status: u16, message: String },
}

impl std::fmt::Display for CalendarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalendarError::NotConfigured => write!(f, "calendar integration is not configured"),
            CalendarError::Validation(msg) => write!(f, "invalid calendar event: {msg}"),
            CalendarError::Http(e) => write!(f, "calendar service unreachable: {e}"),
            CalendarError::Api { status, message } => {
                write!(f, "calendar service error ({status}): {message}")
            }
        }
    }
}

impl std::error::Error for CalendarError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CalendarEvent {
    pub fn validate(&self) -> Result<(), CalendarError> {
        if self.summary.trim().is_empty() {
            return Err(CalendarError::Validation("summary is required".into()));
        }
        if self.end <= self.start {
            return Err(CalendarError::Validation("end must be after start".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    pub id: String,
    #[serde(default)]
    pub html_link: Option<String>,
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn create_event(&self, event: &CalendarEvent) -> Result<CreatedEvent, CalendarError>;
}

/// Stand-in used when no calendar is configured.
pub struct Unconfigured;

#[async_trait]
impl CalendarClient for Unconfigured {
    async fn create_event(&self, _event: &CalendarEvent) -> Result<CreatedEvent, CalendarError> {
        Err(CalendarError::NotConfigured)
    }
}

/// Google Calendar v3 events API with a bearer access token.
pub struct GoogleCalendar {
    client: Client,
    config: CalendarConfig,
}

#[derive(Serialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: String,
    #[serde(rename = "timeZone")]
    time_zone: &'static str,
}

#[derive(Serialize)]
struct EventBody<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    start: EventTime,
    end: EventTime,
}

#[derive(Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleError,
}

#[derive(Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
}

impl GoogleCalendar {
    pub fn new(config: CalendarConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn events_url(&self) -> String {
        let id: String = url::form_urlencoded::byte_serialize(self.config.calendar_id.as_bytes()).collect();
        format!(
            "{}/calendar/v3/calendars/{id}/events",
            self.config.api_base.trim_end_matches('/')
        )
    }
}

fn event_body(event: &CalendarEvent) -> EventBody<'_> {
    EventBody {
        summary: &event.summary,
        description: event.description.as_deref(),
        location: event.location.as_deref(),
        start: EventTime {
            date_time: event.start.to_rfc3339(),
            time_zone: "UTC",
        },
        end: EventTime {
            date_time: event.end.to_rfc3339(),
            time_zone: "UTC",
        },
    }
}

#[async_trait]
impl CalendarClient for GoogleCalendar {
    async fn create_event(&self, event: &CalendarEvent) -> Result<CreatedEvent, CalendarError> {
        event.validate()?;
        let response = self
            .client
            .post(self.events_url())
            .bearer_auth(&self.config.access_token)
            .json(&event_body(event))
            .send()
            .await
            .map_err(|e| CalendarError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<GoogleErrorEnvelope>().await {
                Ok(envelope) => envelope.error.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(CalendarError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let created: CreatedEvent = response
            .json()
            .await
            .map_err(|e| CalendarError::Http(e.to_string()))?;
        info!(event = %created.id, summary = %event.summary, "created calendar event");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> CalendarEvent {
        CalendarEvent {
            summary: "Mixing session".into(),
            description: Some("Studio A".into()),
            location: None,
            start: "2025-03-01T09:00:00Z".parse().unwrap(),
            end: "2025-03-01T11:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn event_must_have_summary_and_positive_length() {
        assert!(event().validate().is_ok());
        let mut e = event();
        e.summary = "  ".into();
        assert!(matches!(e.validate(), Err(CalendarError::Validation(_))));
        let mut e = event();
        e.end = e.start;
        assert!(matches!(e.validate(), Err(CalendarError::Validation(_))));
    }

    #[test]
    fn google_body_shape() {
        let e = event();
        let json = serde_json::to_value(event_body(&e)).unwrap();
        assert_eq!(json["summary"], "Mixing session");
        assert_eq!(json["start"]["dateTime"], "2025-03-01T09:00:00+00:00");
        assert_eq!(json["end"]["timeZone"], "UTC");
        assert!(json.get("location").is_none());
    }

    #[test]
    fn calendar_id_is_escaped_in_url() {
        let cal = GoogleCalendar::new(CalendarConfig {
            calendar_id: "team@group.calendar.google.com".into(),
            access_token: "t".into(),
            api_base: "https://www.googleapis.com/".into(),
        });
        assert_eq!(
            cal.events_url(),
            "https://www.googleapis.com/calendar/v3/calendars/team%40group.calendar.google.com/events"
        );
    }

    #[tokio::test]
    async fn unconfigured_fails_only_the_action() {
        assert!(matches!(
            Unconfigured.create_event(&event()).await,
            Err(CalendarError::NotConfigured)
        ));
    }
}
