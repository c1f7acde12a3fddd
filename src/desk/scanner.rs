use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use super::session::{ApiClient, ClientError};
use crate::{
    attendance::dto::{EntryView, MarkedView},
    users::{dto::{LookupView, UserView}, Role},
};

/// The calls the desk makes against the server.
#[async_trait]
pub trait AttendanceApi: Send + Sync {
    async fn lookup(&self, code: &str) -> Result<LookupView, ClientError>;
    async fn mark(
        &self,
        user_id: Uuid,
        subject: &str,
        qr_code: Option<&str>,
    ) -> Result<MarkedView, ClientError>;
    async fn unmark(&self, attendance_id: i64) -> Result<(), ClientError>;
    async fn today(&self) -> Result<Vec<EntryView>, ClientError>;
}

#[async_trait]
impl AttendanceApi for ApiClient {
    async fn lookup(&self, code: &str) -> Result<LookupView, ClientError> {
        ApiClient::lookup(self, code).await
    }

    async fn mark(
        &self,
        user_id: Uuid,
        subject: &str,
        qr_code: Option<&str>,
    ) -> Result<MarkedView, ClientError> {
        ApiClient::mark(self, user_id, subject, qr_code).await
    }

    async fn unmark(&self, attendance_id: i64) -> Result<(), ClientError> {
        ApiClient::unmark(self, attendance_id).await
    }

    async fn today(&self) -> Result<Vec<EntryView>, ClientError> {
        ApiClient::today(self).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Paused,
    NoSubject,
    EmptyCode,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Marked {
        student: LookupView,
        attendance_id: i64,
    },
    AlreadyMarked {
        student: LookupView,
    },
    UnknownCode(String),
    Ignored(IgnoreReason),
    Failed(String),
}

/// Sound the desk plays for an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Success,
    Warning,
    Error,
    Silent,
}

impl ScanOutcome {
    pub fn cue(&self) -> Cue {
        match self {
            ScanOutcome::Marked { .. } => Cue::Success,
            ScanOutcome::AlreadyMarked { .. } => Cue::Warning,
            ScanOutcome::UnknownCode(_) | ScanOutcome::Failed(_) => Cue::Error,
            ScanOutcome::Ignored(_) => Cue::Silent,
        }
    }
}

/// Progress of a manual toggle. The row shows the new state while `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Pending,
    Confirmed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterRow {
    pub user_id: Uuid,
    pub name: String,
    pub registration_number: Option<String>,
    pub present: bool,
    pub attendance_id: Option<i64>,
    pub toggle: Option<Toggle>,
}

/// A toggle whose local flip is applied and whose server call is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingToggle {
    pub user_id: Uuid,
    was_present: bool,
    attendance_id: Option<i64>,
}

pub struct ScanDesk<A> {
    api: A,
    subject: Option<String>,
    paused: bool,
    dedupe_window: Duration,
    recent: HashMap<String, Instant>,
    roster: Vec<RosterRow>,
}

impl<A: AttendanceApi> ScanDesk<A> {
    pub fn new(api: A, dedupe_window: Duration) -> Self {
        Self {
            api,
            subject: None,
            paused: false,
            dedupe_window,
            recent: HashMap::new(),
            roster: Vec::new(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Blank names clear the subject. A new subject starts a fresh dedupe window
    /// and forgets presence until [`apply_today`](Self::apply_today) runs again.
    pub fn set_subject(&mut self, name: &str) {
        let name = name.trim();
        self.subject = (!name.is_empty()).then(|| name.to_string());
        self.recent.clear();
        for row in &mut self.roster {
            row.present = false;
            row.attendance_id = None;
            row.toggle = None;
        }
        info!(subject = ?self.subject, "desk subject set");
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn roster(&self) -> &[RosterRow] {
        &self.roster
    }

    /// Student accounts become roster rows, sorted by name.
    pub fn load_roster(&mut self, users: &[UserView]) {
        let mut rows: Vec<RosterRow> = users
            .iter()
            .filter(|u| u.role == Role::User && u.is_active)
            .map(|u| RosterRow {
                user_id: u.id,
                name: u.full_name.clone(),
                registration_number: u.registration_number.clone(),
                present: false,
                attendance_id: None,
                toggle: None,
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        self.roster = rows;
    }

    /// Marks rows present from today's records for the current subject.
    pub fn apply_today(&mut self, entries: &[EntryView]) {
        let Some(subject) = self.subject.clone() else {
            return;
        };
        for row in &mut self.roster {
            let hit = entries
                .iter()
                .find(|e| e.user_id == row.user_id && e.subject == subject);
            row.present = hit.is_some();
            row.attendance_id = hit.map(|e| e.id);
        }
    }

    /// Id of the record the server already holds for `user_id` under `subject` today.
    async fn existing_record(&self, user_id: Uuid, subject: &str) -> Result<i64, ClientError> {
        self.api
            .today()
            .await?
            .into_iter()
            .find(|e| e.user_id == user_id && e.subject == subject)
            .map(|e| e.id)
            .ok_or_else(|| ClientError::NotFound("attendance record not in today's list".into()))
    }

    fn row_mut(&mut self, user_id: Uuid) -> Option<&mut RosterRow> {
        self.roster.iter_mut().find(|r| r.user_id == user_id)
    }

    pub async fn scan(&mut self, code: &str) -> ScanOutcome {
        self.scan_at(code, Instant::now()).await
    }

    pub async fn scan_at(&mut self, code: &str, now: Instant) -> ScanOutcome {
        let code = code.trim();
        if code.is_empty() {
            return ScanOutcome::Ignored(IgnoreReason::EmptyCode);
        }
        if self.paused {
            return ScanOutcome::Ignored(IgnoreReason::Paused);
        }
        let Some(subject) = self.subject.clone() else {
            return ScanOutcome::Ignored(IgnoreReason::NoSubject);
        };

        let window = self.dedupe_window;
        self.recent
            .retain(|_, seen| now.saturating_duration_since(*seen) < window);
        if self.recent.contains_key(code) {
            return ScanOutcome::Ignored(IgnoreReason::Duplicate);
        }
        self.recent.insert(code.to_string(), now);

        let student = match self.api.lookup(code).await {
            Ok(s) => s,
            Err(ClientError::NotFound(_)) => {
                warn!(%code, "scanned code matches no student");
                return ScanOutcome::UnknownCode(code.to_string());
            }
            Err(e) => return ScanOutcome::Failed(e.to_string()),
        };

        match self.api.mark(student.id, &subject, Some(code)).await {
            Ok(marked) => {
                if let Some(row) = self.row_mut(student.id) {
                    row.present = true;
                    row.attendance_id = Some(marked.id);
                }
                info!(user_id = %student.id, %subject, "scan marked");
                ScanOutcome::Marked {
                    student,
                    attendance_id: marked.id,
                }
            }
            Err(ClientError::Conflict(_)) => {
                let existing = match self.existing_record(student.id, &subject).await {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!(error = %e, user_id = %student.id, "existing record lookup failed");
                        None
                    }
                };
                if let Some(row) = self.row_mut(student.id) {
                    row.present = true;
                    if existing.is_some() {
                        row.attendance_id = existing;
                    }
                }
                ScanOutcome::AlreadyMarked { student }
            }
            Err(ClientError::NotFound(_)) => ScanOutcome::UnknownCode(code.to_string()),
            Err(e) => ScanOutcome::Failed(e.to_string()),
        }
    }

    /// Flips the row locally and marks it pending. `None` if the row is unknown,
    /// already pending, or no subject is set.
    pub fn begin_toggle(&mut self, user_id: Uuid) -> Option<PendingToggle> {
        self.subject.as_ref()?;
        let row = self.row_mut(user_id)?;
        if row.toggle == Some(Toggle::Pending) {
            return None;
        }
        let pending = PendingToggle {
            user_id,
            was_present: row.present,
            attendance_id: row.attendance_id,
        };
        row.present = !row.present;
        row.toggle = Some(Toggle::Pending);
        Some(pending)
    }

    /// Sends the server call for `pending` and settles the row.
    pub async fn finish_toggle(&mut self, pending: PendingToggle) -> Toggle {
        let subject = self.subject.clone().unwrap_or_default();
        let result = match (pending.was_present, pending.attendance_id) {
            (true, Some(id)) => self.api.unmark(id).await.map(|_| None),
            (true, None) => match self.existing_record(pending.user_id, &subject).await {
                Ok(id) => self.api.unmark(id).await.map(|_| None),
                Err(e) => Err(e),
            },
            (false, _) => match self.api.mark(pending.user_id, &subject, None).await {
                Ok(m) => Ok(Some(m.id)),
                Err(ClientError::Conflict(_)) => self
                    .existing_record(pending.user_id, &subject)
                    .await
                    .map(Some),
                Err(e) => Err(e),
            },
        };

        let Some(row) = self.row_mut(pending.user_id) else {
            return Toggle::RolledBack;
        };
        match result {
            Ok(attendance_id) => {
                row.attendance_id = attendance_id;
                row.toggle = Some(Toggle::Confirmed);
                Toggle::Confirmed
            }
            Err(e) => {
                warn!(error = %e, user_id = %pending.user_id, "toggle rolled back");
                row.present = pending.was_present;
                row.toggle = Some(Toggle::RolledBack);
                Toggle::RolledBack
            }
        }
    }

    pub async fn toggle(&mut self, user_id: Uuid) -> Option<Toggle> {
        let pending = self.begin_toggle(user_id)?;
        Some(self.finish_toggle(pending).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::AttendanceStatus;
    use std::sync::Mutex;

    /// Server stand-in keeping one record per (student, subject).
    #[derive(Default)]
    struct FakeApi {
        students: Vec<LookupView>,
        marked: Mutex<Vec<(Uuid, String, i64)>>,
        fail_writes: bool,
    }

    impl FakeApi {
        fn with_student(reg: &str) -> (Self, Uuid) {
            let id = Uuid::new_v4();
            let api = FakeApi {
                students: vec![LookupView {
                    id,
                    name: "Asha Rao".into(),
                    registration_number: Some(reg.into()),
                    department: "CSE".into(),
                    avatar: None,
                }],
                ..Default::default()
            };
            (api, id)
        }
    }

    #[async_trait]
    impl AttendanceApi for FakeApi {
        async fn lookup(&self, code: &str) -> Result<LookupView, ClientError> {
            self.students
                .iter()
                .find(|s| s.registration_number.as_deref() == Some(code))
                .cloned()
                .ok_or_else(|| ClientError::NotFound("User not found".into()))
        }

        async fn mark(
            &self,
            user_id: Uuid,
            subject: &str,
            _qr_code: Option<&str>,
        ) -> Result<MarkedView, ClientError> {
            if self.fail_writes {
                return Err(ClientError::Server {
                    status: 500,
                    message: "Internal server error".into(),
                });
            }
            let mut marked = self.marked.lock().unwrap();
            if marked.iter().any(|(u, s, _)| *u == user_id && s == subject) {
                return Err(ClientError::Conflict(
                    "Attendance already marked for today".into(),
                ));
            }
            let id = marked.len() as i64 + 1;
            marked.push((user_id, subject.to_string(), id));
            Ok(MarkedView {
                id,
                user_id,
                subject_id: 1,
                subject: subject.to_string(),
                date: "2024-09-02".into(),
                time: "09:00:00".into(),
                status: AttendanceStatus::Present,
                marked_by: None,
            })
        }

        async fn unmark(&self, attendance_id: i64) -> Result<(), ClientError> {
            if self.fail_writes {
                return Err(ClientError::Server {
                    status: 500,
                    message: "Internal server error".into(),
                });
            }
            let mut marked = self.marked.lock().unwrap();
            let before = marked.len();
            marked.retain(|(_, _, id)| *id != attendance_id);
            if marked.len() == before {
                return Err(ClientError::NotFound(
                    "Attendance record not found or already deleted.".into(),
                ));
            }
            Ok(())
        }

        async fn today(&self) -> Result<Vec<EntryView>, ClientError> {
            Ok(self
                .marked
                .lock()
                .unwrap()
                .iter()
                .map(|(user_id, subject, id)| entry(*user_id, subject, *id))
                .collect())
        }
    }

    fn entry(user_id: Uuid, subject: &str, id: i64) -> EntryView {
        EntryView {
            id,
            user_id,
            subject_id: 1,
            subject: subject.into(),
            date: "2024-09-02".into(),
            time: "09:00:00".into(),
            status: AttendanceStatus::Present,
            marked_by: None,
            qr_code_used: None,
            user_name: "Asha Rao".into(),
            registration_number: Some("REG2024001".into()),
            email: "asha@klu.ac.in".into(),
            profile_image: None,
        }
    }

    fn row(user_id: Uuid, present: bool, attendance_id: Option<i64>) -> RosterRow {
        RosterRow {
            user_id,
            name: "Asha Rao".into(),
            registration_number: Some("REG2024001".into()),
            present,
            attendance_id,
            toggle: None,
        }
    }

    #[tokio::test]
    async fn scan_marks_then_reports_already_marked() {
        let (api, id) = FakeApi::with_student("REG2024001");
        let mut desk = ScanDesk::new(api, Duration::from_secs(3));
        desk.set_subject("Algorithms-101");
        desk.roster = vec![row(id, false, None)];

        let t0 = Instant::now();
        let first = desk.scan_at("REG2024001", t0).await;
        assert!(matches!(first, ScanOutcome::Marked { attendance_id: 1, .. }));
        assert_eq!(first.cue(), Cue::Success);
        assert!(desk.roster()[0].present);

        let dup = desk.scan_at("REG2024001", t0 + Duration::from_secs(1)).await;
        assert_eq!(dup, ScanOutcome::Ignored(IgnoreReason::Duplicate));
        assert_eq!(dup.cue(), Cue::Silent);

        let again = desk.scan_at("REG2024001", t0 + Duration::from_secs(5)).await;
        assert!(matches!(again, ScanOutcome::AlreadyMarked { .. }));
        assert_eq!(again.cue(), Cue::Warning);
        assert_eq!(desk.api().marked.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scans_are_ignored_without_subject_or_while_paused() {
        let (api, _) = FakeApi::with_student("REG2024001");
        let mut desk = ScanDesk::new(api, Duration::from_secs(3));
        assert_eq!(
            desk.scan("REG2024001").await,
            ScanOutcome::Ignored(IgnoreReason::NoSubject)
        );

        desk.set_subject("  ");
        assert_eq!(desk.subject(), None);
        desk.set_subject("ACM Meetup");
        desk.pause();
        assert_eq!(
            desk.scan("REG2024001").await,
            ScanOutcome::Ignored(IgnoreReason::Paused)
        );
        desk.resume();
        assert!(matches!(desk.scan("REG2024001").await, ScanOutcome::Marked { .. }));
        assert_eq!(desk.scan("   ").await, ScanOutcome::Ignored(IgnoreReason::EmptyCode));
    }

    #[tokio::test]
    async fn unknown_code_plays_error_cue() {
        let (api, _) = FakeApi::with_student("REG2024001");
        let mut desk = ScanDesk::new(api, Duration::from_secs(3));
        desk.set_subject("Algorithms-101");
        let out = desk.scan("NOPE").await;
        assert_eq!(out, ScanOutcome::UnknownCode("NOPE".into()));
        assert_eq!(out.cue(), Cue::Error);
    }

    #[tokio::test]
    async fn toggle_flips_before_the_call_and_confirms() {
        let (api, id) = FakeApi::with_student("REG2024001");
        let mut desk = ScanDesk::new(api, Duration::from_secs(3));
        desk.set_subject("Algorithms-101");
        desk.roster = vec![row(id, false, None)];

        let pending = desk.begin_toggle(id).unwrap();
        assert!(desk.roster()[0].present);
        assert_eq!(desk.roster()[0].toggle, Some(Toggle::Pending));
        assert!(desk.begin_toggle(id).is_none());

        assert_eq!(desk.finish_toggle(pending).await, Toggle::Confirmed);
        assert_eq!(desk.roster()[0].attendance_id, Some(1));

        assert_eq!(desk.toggle(id).await, Some(Toggle::Confirmed));
        assert!(!desk.roster()[0].present);
        assert_eq!(desk.roster()[0].attendance_id, None);
        assert!(desk.api().marked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_toggle_restores_the_row() {
        let (mut api, id) = FakeApi::with_student("REG2024001");
        api.fail_writes = true;
        let mut desk = ScanDesk::new(api, Duration::from_secs(3));
        desk.set_subject("Algorithms-101");
        desk.roster = vec![row(id, true, Some(7))];

        assert_eq!(desk.toggle(id).await, Some(Toggle::RolledBack));
        let r = &desk.roster()[0];
        assert!(r.present);
        assert_eq!(r.attendance_id, Some(7));
        assert_eq!(r.toggle, Some(Toggle::RolledBack));
    }

    #[test]
    fn today_entries_set_presence_for_current_subject() {
        let (api, id) = FakeApi::with_student("REG2024001");
        let mut desk = ScanDesk::new(api, Duration::from_secs(3));
        desk.roster = vec![row(id, false, None)];
        desk.set_subject("Algorithms-101");

        desk.apply_today(&[entry(id, "ACM Meetup", 3), entry(id, "Algorithms-101", 4)]);
        assert!(desk.roster()[0].present);
        assert_eq!(desk.roster()[0].attendance_id, Some(4));
    }

    #[tokio::test]
    async fn student_marked_elsewhere_can_still_be_unmarked() {
        let (api, id) = FakeApi::with_student("REG2024001");
        api.marked
            .lock()
            .unwrap()
            .push((id, "Algorithms-101".to_string(), 41));
        let mut desk = ScanDesk::new(api, Duration::from_secs(3));
        desk.set_subject("Algorithms-101");
        desk.roster = vec![row(id, false, None)];

        let out = desk.scan("REG2024001").await;
        assert!(matches!(out, ScanOutcome::AlreadyMarked { .. }));
        assert!(desk.roster()[0].present);
        assert_eq!(desk.roster()[0].attendance_id, Some(41));

        assert_eq!(desk.toggle(id).await, Some(Toggle::Confirmed));
        assert!(!desk.roster()[0].present);
        assert!(desk.api().marked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unmark_without_known_id_finds_the_record() {
        let (api, id) = FakeApi::with_student("REG2024001");
        api.marked
            .lock()
            .unwrap()
            .push((id, "Algorithms-101".to_string(), 9));
        let mut desk = ScanDesk::new(api, Duration::from_secs(3));
        desk.set_subject("Algorithms-101");
        desk.roster = vec![row(id, true, None)];

        assert_eq!(desk.toggle(id).await, Some(Toggle::Confirmed));
        assert!(desk.api().marked.lock().unwrap().is_empty());
    }
}
