use chrono::{DateTime, Utc};
use log::{debug, info};
use thiserror::Error;

use crate::datetime::{add_millis, elapsed_millis};
use crate::report::{build_report, Report};
use crate::time_entry::{EntryId, ProjectCatalog, TaskInput, TaskType, TimeEntry, ValidTask};

/// タイマー操作で発生するエラー。いずれも状態を変更しない。
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum TimerError {
    #[error("Task name is required")]
    MissingTaskName,

    #[error("Task type is required")]
    MissingTaskType,

    #[error("Project selection is required")]
    MissingProject,

    #[error("A timer is already running")]
    ActiveTimerExists,

    #[error("No timer is running")]
    NoActiveTimer,
}

/// セッション内のタイムエントリーを管理する。
///
/// 計測中のエントリーは常に高々1件で、エントリーは追加のみ行い、
/// 計測中のエントリーを停止する場合に限りその場で更新する。
#[derive(Debug)]
pub struct TimerManager {
    catalog: ProjectCatalog,
    entries: Vec<TimeEntry>,
    active: Option<usize>,
    next_id: u64,
}

impl TimerManager {
    /// 新しい`TimerManager`を返す。
    ///
    /// # Arguments
    ///
    /// * `catalog` - 選択可能なプロジェクトの一覧
    pub fn new(catalog: ProjectCatalog) -> Self {
        Self {
            catalog,
            entries: Vec::new(),
            active: None,
            next_id: 1,
        }
    }

    /// タスク情報を検証する。
    ///
    /// タスク名、タスク種別、プロジェクトの順に検証し、最初に失敗したものを返す。
    pub fn validate(&self, input: &TaskInput) -> Result<ValidTask, TimerError> {
        let task_name = input.task_name.trim();
        if task_name.is_empty() {
            return Err(TimerError::MissingTaskName);
        }

        let task_type = input
            .task_type
            .parse::<TaskType>()
            .map_err(|_| TimerError::MissingTaskType)?;

        let project = self
            .catalog
            .find(&input.project_id)
            .ok_or(TimerError::MissingProject)?;

        Ok(ValidTask {
            task_name: task_name.to_string(),
            task_type,
            project_id: project.id.clone(),
        })
    }

    /// タイマーを開始し、作成したエントリーを返す。
    ///
    /// # Arguments
    ///
    /// * `input` - 入力されたタスク情報
    /// * `owner_id` - 作成したユーザーの識別子
    /// * `now` - 開始時刻
    pub fn start(
        &mut self,
        input: &TaskInput,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<&TimeEntry, TimerError> {
        if self.active.is_some() {
            return Err(TimerError::ActiveTimerExists);
        }
        let task = self.validate(input)?;

        let entry = TimeEntry {
            id: EntryId(self.next_id),
            task_name: task.task_name,
            task_type: task.task_type,
            project_id: task.project_id,
            owner_id: owner_id.to_string(),
            start_time: now,
            end_time: None,
            duration: 0,
        };
        self.next_id += 1;
        info!("Timer started: id={}, task={}", entry.id, entry.task_name);

        self.entries.push(entry);
        let index = self.entries.len() - 1;
        self.active = Some(index);

        Ok(&self.entries[index])
    }

    /// 計測中のエントリーの`duration`を更新し、その値を返す。
    ///
    /// 計測中のエントリーがない場合は何もしない。
    /// 時計が巻き戻った場合でも`duration`は減少しない。
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<i64> {
        let index = self.active?;
        let entry = &mut self.entries[index];
        entry.duration = entry.duration.max(elapsed_millis(&entry.start_time, &now));
        debug!("Timer ticked: id={}, duration={}", entry.id, entry.duration);

        Some(entry.duration)
    }

    /// タイマーを停止し、停止したエントリーを返す。
    ///
    /// 終了時刻は、開始時刻に最後に観測した`duration`を加えた時刻より前にはならない。
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<&TimeEntry, TimerError> {
        let index = self.active.take().ok_or(TimerError::NoActiveTimer)?;
        let entry = &mut self.entries[index];

        let end_time = now.max(add_millis(&entry.start_time, entry.duration));
        entry.end_time = Some(end_time);
        entry.duration = elapsed_millis(&entry.start_time, &end_time);
        info!(
            "Timer stopped: id={}, duration={}",
            entry.id, entry.duration
        );

        Ok(&*entry)
    }

    /// 最新の状態に更新してから、全体とプロジェクトごとの集計を返す。
    pub fn report(&mut self, now: DateTime<Utc>) -> Report {
        self.tick(now);
        build_report(&self.entries, &self.catalog)
    }

    /// 全てのエントリーを破棄する。ログアウト時に呼び出す。
    pub fn session_reset(&mut self) {
        info!("Discarding {} time entries", self.entries.len());
        self.entries.clear();
        self.active = None;
        self.next_id = 1;
    }

    /// 作成順のエントリー一覧を返す。
    pub fn entries(&self) -> &[TimeEntry] {
        &self.entries
    }

    /// 計測中のエントリーを返す。
    pub fn active(&self) -> Option<&TimeEntry> {
        self.active.map(|index| &self.entries[index])
    }

    pub fn catalog(&self) -> &ProjectCatalog {
        &self.catalog
    }
}
