use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::WindowStatus;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SlotQuery {
    pub court_id: Uuid,
    /// Calendar day, `YYYY-MM-DD`, interpreted in UTC.
    pub date: String,
}

/// One bookable hour on the calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SlotWindow {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: WindowStatus,
    /// Present only when the owner materialized this hour.
    pub slot_id: Option<Uuid>,
    pub price: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SlotWindowList {
    pub items: Vec<SlotWindow>,
}
