//! The request/response/error triple read during one formatting call.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::error::Error;

use crate::types::{RequestData, ResponseData};

/// Borrowed, read-only view of one exchange.
///
/// The wall-clock instant is captured once when the context is built, so
/// every time-based placeholder in a single expansion agrees. Local-time
/// placeholders render in `timezone`, UTC unless set with
/// [`in_zone`](Self::in_zone).
#[derive(Debug, Clone, Copy)]
pub struct ResolutionContext<'a> {
    request: &'a RequestData,
    response: Option<&'a ResponseData>,
    error: Option<&'a (dyn Error + 'a)>,
    now: DateTime<Utc>,
    timezone: Tz,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(request: &'a RequestData) -> Self {
        Self {
            request,
            response: None,
            error: None,
            now: Utc::now(),
            timezone: Tz::UTC,
        }
    }

    pub fn with_response(mut self, response: &'a ResponseData) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_error(mut self, error: &'a (dyn Error + 'a)) -> Self {
        self.error = Some(error);
        self
    }

    /// Pins the instant used by `ts`, `date_iso_8601` and `date_common_log`.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn in_zone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn request(&self) -> &'a RequestData {
        self.request
    }

    pub fn response(&self) -> Option<&'a ResponseData> {
        self.response
    }

    pub fn error(&self) -> Option<&'a (dyn Error + 'a)> {
        self.error
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}
