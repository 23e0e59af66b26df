use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::{
    dto::slots::{SlotQuery, SlotWindow, SlotWindowList},
    entity::{
        courts::Entity as Courts,
        slots::{Column as SlotCol, Entity as Slots, Model as SlotModel},
    },
    error::{AppError, AppResult},
    models::WindowStatus,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn get_slots(state: &AppState, query: SlotQuery) -> AppResult<ApiResponse<SlotWindowList>> {
    let date = NaiveDate::parse_from_str(&query.date, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidArgument("date must be YYYY-MM-DD".into()))?;

    let court = Courts::find_by_id(query.court_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let day_start = Utc
        .from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default());
    let day_end = day_start + Duration::days(1);

    let slots = Slots::find()
        .filter(SlotCol::CourtId.eq(court.id))
        .filter(SlotCol::StartTime.gte(day_start))
        .filter(SlotCol::StartTime.lt(day_end))
        .order_by_asc(SlotCol::StartTime)
        .all(&state.orm)
        .await?;

    let windows = build_day_windows(
        court.open_hour,
        court.close_hour,
        date,
        &slots,
        Utc::now(),
    );

    Ok(ApiResponse::success(
        "Ok",
        SlotWindowList { items: windows },
        Some(Meta::empty()),
    ))
}

/// Derive the calendar grid for one court-day. Pure over the fetched slot
/// rows: each hour in [open_hour, close_hour) becomes a window, classified by
/// exact start-time match against the materialized slots. Windows already in
/// the past are dropped, which only ever applies to "today".
pub fn build_day_windows(
    open_hour: i32,
    close_hour: i32,
    date: NaiveDate,
    slots: &[SlotModel],
    now: DateTime<Utc>,
) -> Vec<SlotWindow> {
    let mut windows = Vec::new();
    for hour in open_hour.max(0)..close_hour.min(24) {
        let Some(naive) = date.and_hms_opt(hour as u32, 0, 0) else {
            continue;
        };
        let start = Utc.from_utc_datetime(&naive);
        if start < now {
            continue;
        }
        let end = start + Duration::hours(1);

        let window = match slots
            .iter()
            .find(|s| s.start_time.with_timezone(&Utc) == start)
        {
            Some(slot) => SlotWindow {
                start_time: start,
                end_time: end,
                status: if slot.is_booked {
                    WindowStatus::Booked
                } else {
                    WindowStatus::Available
                },
                slot_id: Some(slot.id),
                price: Some(slot.price),
            },
            None => SlotWindow {
                start_time: start,
                end_time: end,
                status: WindowStatus::NotCreated,
                slot_id: None,
                price: None,
            },
        };
        windows.push(window);
    }
    windows
}
