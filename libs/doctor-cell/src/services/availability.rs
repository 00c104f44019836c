use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailabilityWindow, AvailableSlotsResponse, BookedAppointment, DoctorError,
    ReplaceScheduleRequest, ScheduleReplaceSummary, ScheduleWindowInput,
};
use crate::services::doctor::DoctorService;

/// Parse an "HH:MM" wall-clock string into a minute-of-day. Seconds are
/// tolerated ("HH:MM:SS") since Postgres time columns render them.
pub fn parse_hhmm(time: &str) -> Option<u32> {
    let mut parts = time.split(':');
    let hours: u32 = parts.next()?.parse().ok()?;
    let minutes: u32 = parts.next()?.parse().ok()?;
    if hours >= 24 || minutes >= 60 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Day-of-week index used by availability windows: 0 = Sunday .. 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

/// Walk a window from start to end in slot-duration steps and keep the
/// candidates that are still open: no existing non-cancelled appointment at
/// exactly that hour:minute, and strictly in the future.
///
/// Termination depends only on the window arithmetic, never on bookings; a
/// malformed window (end <= start, unparseable times, non-positive duration)
/// yields an empty list rather than an error.
pub fn compute_open_slots(
    window: &AvailabilityWindow,
    date: NaiveDate,
    booked: &[BookedAppointment],
    now: DateTime<Utc>,
) -> Vec<String> {
    let (start, end) = match (parse_hhmm(&window.start_time), parse_hhmm(&window.end_time)) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            warn!(
                "Unparseable availability window times for doctor {}: {} - {}",
                window.doctor_id, window.start_time, window.end_time
            );
            return Vec::new();
        }
    };

    if window.slot_duration_minutes <= 0 || end <= start {
        return Vec::new();
    }
    let duration = window.slot_duration_minutes as u32;

    let mut slots = Vec::new();
    let mut minute = start;
    while minute + duration <= end {
        let time = NaiveTime::from_hms_opt(minute / 60, minute % 60, 0)
            .expect("minute-of-day stays under 24h");
        let candidate = date.and_time(time).and_utc();

        let taken = booked
            .iter()
            .any(|apt| apt.scheduled_at.hour() == time.hour() && apt.scheduled_at.minute() == time.minute());

        if !taken && candidate > now {
            slots.push(format!("{:02}:{:02}", minute / 60, minute % 60));
        }

        minute += duration;
    }

    slots
}

/// Validate a full weekly schedule before it is sent to the replacement
/// transaction.
pub fn validate_schedule_windows(windows: &[ScheduleWindowInput]) -> Result<(), DoctorError> {
    for window in windows {
        if window.day_of_week < 0 || window.day_of_week > 6 {
            return Err(DoctorError::ValidationError(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }

        let start = parse_hhmm(&window.start_time).ok_or_else(|| {
            DoctorError::ValidationError(format!("Invalid start time: {}", window.start_time))
        })?;
        let end = parse_hhmm(&window.end_time).ok_or_else(|| {
            DoctorError::ValidationError(format!("Invalid end time: {}", window.end_time))
        })?;

        if start >= end {
            return Err(DoctorError::ValidationError(
                "Start time must be before end time".to_string(),
            ));
        }
        if window.slot_duration_minutes <= 0 {
            return Err(DoctorError::ValidationError(
                "Slot duration must be positive".to_string(),
            ));
        }
        if window.max_patients_per_slot.unwrap_or(1) < 1 {
            return Err(DoctorError::ValidationError(
                "Max patients per slot must be at least 1".to_string(),
            ));
        }
    }

    Ok(())
}

pub struct AvailabilityService {
    supabase: SupabaseClient,
    doctor_service: DoctorService,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctor_service: DoctorService::new(config),
        }
    }

    /// Open, bookable slot start times for one doctor and one calendar date.
    pub async fn get_available_slots(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<AvailableSlotsResponse, DoctorError> {
        debug!("Calculating available slots for doctor {} on {}", doctor_id, date);

        // NotFound covers absent, inactive and soft-deleted alike.
        self.doctor_service
            .get_active_doctor(doctor_id, auth_token)
            .await?;

        let window = match self
            .get_window_for_day(doctor_id, weekday_index(date), auth_token)
            .await?
        {
            Some(window) => window,
            None => {
                // "No availability" is a valid state, not an error.
                return Ok(AvailableSlotsResponse {
                    available_slots: Vec::new(),
                    message: Some("The doctor has no availability on this day".to_string()),
                });
            }
        };

        let booked = self
            .get_booked_appointments(doctor_id, date, auth_token)
            .await?;

        let slots = compute_open_slots(&window, date, &booked, Utc::now());
        debug!("Found {} open slots", slots.len());

        Ok(AvailableSlotsResponse {
            available_slots: slots,
            message: None,
        })
    }

    /// The doctor's full weekly schedule, active windows first.
    pub async fn get_weekly_schedule(
        &self,
        doctor_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Vec<AvailabilityWindow>, DoctorError> {
        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&order=day_of_week.asc,start_time.asc",
            doctor_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| DoctorError::DatabaseError(e.to_string()))
            })
            .collect()
    }

    /// Replace the doctor's entire weekly schedule in one transaction.
    ///
    /// The `replace_doctor_schedule` Postgres function deletes the existing
    /// windows, inserts the new set and writes a schedule_audit row; PostgREST
    /// runs the function in a single transaction, so a failure at any step
    /// leaves the original schedule intact.
    pub async fn replace_schedule(
        &self,
        doctor_id: &str,
        request: ReplaceScheduleRequest,
        changed_by: &str,
        auth_token: &str,
    ) -> Result<ScheduleReplaceSummary, DoctorError> {
        debug!(
            "Replacing schedule for doctor {} with {} windows",
            doctor_id,
            request.availability.len()
        );

        validate_schedule_windows(&request.availability)?;

        // Deactivated doctors may still manage their schedule; deleted ones may not.
        self.doctor_service.get_doctor(doctor_id, Some(auth_token)).await?;

        let windows: Vec<Value> = request
            .availability
            .iter()
            .map(|window| {
                json!({
                    "day_of_week": window.day_of_week,
                    "start_time": window.start_time,
                    "end_time": window.end_time,
                    "slot_duration_minutes": window.slot_duration_minutes,
                    "max_patients_per_slot": window.max_patients_per_slot.unwrap_or(1),
                    "is_active": window.is_active.unwrap_or(true),
                })
            })
            .collect();

        let summary: ScheduleReplaceSummary = self
            .supabase
            .rpc(
                "replace_doctor_schedule",
                Some(auth_token),
                json!({
                    "p_doctor_id": doctor_id,
                    "p_windows": windows,
                    "p_changed_by": changed_by,
                }),
            )
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        Ok(summary)
    }

    // Private helpers

    /// Only the first active window for the day is consulted.
    async fn get_window_for_day(
        &self,
        doctor_id: &str,
        day_of_week: i32,
        auth_token: Option<&str>,
    ) -> Result<Option<AvailabilityWindow>, DoctorError> {
        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&day_of_week=eq.{}&is_active=eq.true&order=start_time.asc",
            doctor_id, day_of_week
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| DoctorError::DatabaseError(e.to_string())),
            None => Ok(None),
        }
    }

    async fn get_booked_appointments(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<BookedAppointment>, DoctorError> {
        let start_of_day = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let end_of_day = date.and_hms_opt(23, 59, 59).unwrap().and_utc();

        // RFC 3339 offsets carry a '+' that form-decoding would turn into a
        // space, so the timestamps must be percent-encoded.
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&scheduled_at=gte.{}&scheduled_at=lte.{}&status=neq.cancelled&select=scheduled_at&order=scheduled_at.asc",
            doctor_id,
            urlencoding::encode(&start_of_day.to_rfc3339()),
            urlencoding::encode(&end_of_day.to_rfc3339())
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| DoctorError::DatabaseError(e.to_string()))
            })
            .collect()
    }
}
