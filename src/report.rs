use crate::time_entry::{Project, ProjectCatalog, TimeEntry};

/// プロジェクトごとの集計結果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectTotal {
    pub project: Project,
    pub duration: i64,
}

/// 全体とプロジェクトごとの集計結果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub total: i64,
    pub projects: Vec<ProjectTotal>,
}

/// 条件に一致するタイムエントリーの`duration`を合計する。
///
/// 計測中のエントリーは最後に更新された値で集計されるため、
/// 最新の値が必要な場合は事前に`tick`を呼び出すこと。
pub fn aggregate<P>(entries: &[TimeEntry], predicate: P) -> i64
where
    P: Fn(&TimeEntry) -> bool,
{
    entries
        .iter()
        .filter(|entry| predicate(*entry))
        .map(|entry| entry.duration)
        .sum()
}

/// 全体とプロジェクトごとの集計を作成する。
///
/// プロジェクトはカタログの順序で、記録のないプロジェクトも0として含める。
pub fn build_report(entries: &[TimeEntry], catalog: &ProjectCatalog) -> Report {
    let projects = catalog
        .projects()
        .iter()
        .map(|project| ProjectTotal {
            project: project.clone(),
            duration: aggregate(entries, |entry| entry.project_id == project.id),
        })
        .collect();

    Report {
        total: aggregate(entries, |_| true),
        projects,
    }
}

/// ミリ秒を`HH:MM:SS`形式の文字列にする。時間の桁数は制限しない。
pub fn format_duration(millis: i64) -> String {
    let seconds_total = millis.max(0) / 1000;
    let seconds = seconds_total % 60;
    let minutes = (seconds_total / 60) % 60;
    let hours = seconds_total / 3600;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
