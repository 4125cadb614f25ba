//! Booking and interpreter data model.
//!
//! A booking is a request for interpreter service over a half-open time
//! interval `[time_start, time_end)`. The engine only ever mutates
//! `assigned_interpreter` and `status`; everything else is owned by the
//! surrounding booking service.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Meeting class of a booking. Influences thresholds, weights and the
/// consecutive-assignment policy (DR only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeetingType {
    Dr,
    Vip,
    Weekly,
    General,
    Urgent,
    Other,
    President,
}

impl MeetingType {
    /// All meeting types, in priority-table order.
    pub const ALL: [MeetingType; 7] = [
        MeetingType::President,
        MeetingType::Dr,
        MeetingType::Vip,
        MeetingType::Urgent,
        MeetingType::Weekly,
        MeetingType::General,
        MeetingType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingType::Dr => "DR",
            MeetingType::Vip => "VIP",
            MeetingType::Weekly => "Weekly",
            MeetingType::General => "General",
            MeetingType::Urgent => "Urgent",
            MeetingType::Other => "Other",
            MeetingType::President => "President",
        }
    }

    /// Parse from the storage representation. Unknown strings fall back to
    /// `Other`, matching how the booking service tags uncategorised meetings.
    pub fn parse(s: &str) -> MeetingType {
        match s {
            "DR" => MeetingType::Dr,
            "VIP" => MeetingType::Vip,
            "Weekly" => MeetingType::Weekly,
            "General" => MeetingType::General,
            "Urgent" => MeetingType::Urgent,
            "President" => MeetingType::President,
            _ => MeetingType::Other,
        }
    }
}

/// Lifecycle status of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Submitted, not yet decided.
    Waiting,
    /// An interpreter is assigned and confirmed.
    Approve,
    /// Cancelled by the owner or an admin.
    Cancel,
    /// The meeting took place.
    Complete,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Waiting => "waiting",
            BookingStatus::Approve => "approve",
            BookingStatus::Cancel => "cancel",
            BookingStatus::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> BookingStatus {
        match s {
            "approve" => BookingStatus::Approve,
            "cancel" => BookingStatus::Cancel,
            "complete" => BookingStatus::Complete,
            _ => BookingStatus::Waiting,
        }
    }
}

/// A single interpreter booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// Stable identifier assigned by the booking service.
    pub id: i64,
    pub meeting_type: MeetingType,
    /// DR sub-class (e.g. "DR-I", "DR-II"). Only meaningful for DR bookings.
    #[serde(default)]
    pub dr_type: Option<String>,
    /// Start of the service interval (inclusive).
    pub time_start: DateTime<Utc>,
    /// End of the service interval (exclusive).
    pub time_end: DateTime<Utc>,
    pub room: String,
    /// Employee code of the booking owner.
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub status: BookingStatus,
    /// Employee code of the assigned interpreter, once decided.
    #[serde(default)]
    pub assigned_interpreter: Option<String>,
}

impl Booking {
    /// Duration of the service interval.
    pub fn duration(&self) -> Duration {
        self.time_end - self.time_start
    }

    /// Duration in fractional hours.
    pub fn duration_hours(&self) -> f64 {
        (self.time_end - self.time_start).num_minutes() as f64 / 60.0
    }

    /// Half-open overlap with `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.time_start < end && self.time_end > start
    }

    /// Whether the interval is well-formed (`time_end > time_start`).
    pub fn is_valid_interval(&self) -> bool {
        self.time_end > self.time_start
    }
}

/// An actively assignable interpreter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpreter {
    /// Stable employee code, e.g. "EMP-0042".
    pub id: String,
    pub active: bool,
    pub joined_at: DateTime<Utc>,
}

impl Interpreter {
    pub fn new(id: impl Into<String>, joined_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            active: true,
            joined_at,
        }
    }
}
