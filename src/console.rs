use std::io::Write;

use anyhow::{Context, Result};
use chrono::Local;

use crate::report::{format_duration, Report};
use crate::time_entry::{ProjectCatalog, TaskType, TimeEntry};

/// Consoleにセッションの状態を表示するためのtrait。
pub trait ConsolePresenter {
    /// メッセージを1行表示する。
    fn show_message(&mut self, message: &str) -> Result<()>;

    /// タイムエントリーを新しいものから順に表示する。
    ///
    /// # Arguments
    ///
    /// * `time_entries` - 作成順のタイムエントリー
    fn show_time_entries(&mut self, time_entries: &[TimeEntry]) -> Result<()>;

    /// 計測中のタイムエントリーを表示する。
    fn show_active(&mut self, active: Option<&TimeEntry>) -> Result<()>;

    /// 集計結果を表示する。
    fn show_report(&mut self, report: &Report) -> Result<()>;

    /// プロジェクトとタスク種別の一覧を表示する。
    fn show_projects(&mut self) -> Result<()>;
}

/// セッションの状態をテキストで表示する。
pub struct ConsoleText<'a, W: Write> {
    writer: &'a mut W,
    catalog: ProjectCatalog,
}

impl<'a, W: Write> ConsoleText<'a, W> {
    /// 新しい`ConsoleText`を返す。
    ///
    /// # Arguments
    ///
    /// * `writer` - 出力先
    /// * `catalog` - プロジェクト名の表示に用いる一覧
    pub fn new(writer: &'a mut W, catalog: ProjectCatalog) -> Self {
        Self { writer, catalog }
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleText<'a, W> {
    fn show_message(&mut self, message: &str) -> Result<()> {
        writeln!(self.writer, "{}", message).context("Failed to write message")?;
        self.writer.flush().context("Failed to flush output")
    }

    // 計測中のエントリーは表示時点で保持している値を表示する。
    fn show_time_entries(&mut self, time_entries: &[TimeEntry]) -> Result<()> {
        if time_entries.is_empty() {
            return self.show_message("No entries yet");
        }

        for entry in time_entries.iter().rev() {
            let start_str = entry
                .start_time
                .with_timezone(&Local)
                .format("%H:%M")
                .to_string();
            let end_str = entry
                .end_time
                .map(|end| end.with_timezone(&Local).format("%H:%M").to_string())
                .unwrap_or_else(|| "now".to_string());
            writeln!(
                self.writer,
                "- {} [{}] [{}] {} ~ {} {}",
                entry.task_name,
                entry.task_type.label(),
                self.catalog.name_of(&entry.project_id),
                start_str,
                end_str,
                format_duration(entry.duration)
            )
            .with_context(|| format!("Failed to write time entry: {:?}", entry))?;
        }

        Ok(())
    }

    fn show_active(&mut self, active: Option<&TimeEntry>) -> Result<()> {
        match active {
            Some(entry) => {
                let message = format!(
                    "Running: {} ({}) {}",
                    entry.task_name,
                    self.catalog.name_of(&entry.project_id),
                    format_duration(entry.duration)
                );
                self.show_message(&message)
            }
            None => self.show_message("No active timer"),
        }
    }

    fn show_report(&mut self, report: &Report) -> Result<()> {
        writeln!(
            self.writer,
            "Total Time Tracked: {}",
            format_duration(report.total)
        )
        .context("Failed to write report total")?;
        writeln!(self.writer, "Time by Project:").context("Failed to write report header")?;
        for row in &report.projects {
            writeln!(
                self.writer,
                "  - {}: {}",
                row.project.name,
                format_duration(row.duration)
            )
            .with_context(|| format!("Failed to write project total: {}", row.project.id))?;
        }

        Ok(())
    }

    fn show_projects(&mut self) -> Result<()> {
        writeln!(self.writer, "Projects:").context("Failed to write projects header")?;
        for project in self.catalog.projects() {
            writeln!(self.writer, "  {}: {}", project.id, project.name)
                .with_context(|| format!("Failed to write project: {}", project.id))?;
        }
        writeln!(self.writer, "Task types:").context("Failed to write task types header")?;
        for task_type in TaskType::ALL {
            writeln!(self.writer, "  {}: {}", task_type.id(), task_type.label())
                .with_context(|| format!("Failed to write task type: {}", task_type.id()))?;
        }

        Ok(())
    }
}
