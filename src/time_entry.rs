use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// タイムエントリーの識別子。セッション内で作成順に単調増加する。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// タスクの種類。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Coding,
    Analysis,
    Recruitment,
    Other,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::Coding,
        TaskType::Analysis,
        TaskType::Recruitment,
        TaskType::Other,
    ];

    /// 入力に用いる識別子を返す。
    pub fn id(&self) -> &'static str {
        match self {
            TaskType::Coding => "coding",
            TaskType::Analysis => "analysis",
            TaskType::Recruitment => "recruitment",
            TaskType::Other => "other",
        }
    }

    /// 表示用の名前を返す。
    pub fn label(&self) -> &'static str {
        match self {
            TaskType::Coding => "Coding",
            TaskType::Analysis => "Analysis",
            TaskType::Recruitment => "Recruitment",
            TaskType::Other => "Other",
        }
    }
}

/// 未知のタスク種別を表すエラー。
#[derive(Debug, PartialEq, Eq)]
pub struct UnknownTaskType(pub String);

impl FromStr for TaskType {
    type Err = UnknownTaskType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .iter()
            .find(|task_type| task_type.id() == s)
            .copied()
            .ok_or_else(|| UnknownTaskType(s.to_string()))
    }
}

/// プロジェクト情報。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

impl Project {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

/// 選択可能なプロジェクトの一覧。読み取り専用。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectCatalog {
    projects: Vec<Project>,
}

impl ProjectCatalog {
    pub fn new(projects: Vec<Project>) -> Self {
        Self { projects }
    }

    /// 指定したidのプロジェクトを返す。
    pub fn find(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|project| project.id == id)
    }

    /// 指定したidのプロジェクト名を返す。見つからない場合はidをそのまま返す。
    pub fn name_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.find(id).map(|project| project.name.as_str()).unwrap_or(id)
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }
}

impl Default for ProjectCatalog {
    fn default() -> Self {
        Self::new(default_projects())
    }
}

/// 既定のプロジェクト一覧を返す。
pub fn default_projects() -> Vec<Project> {
    vec![
        Project::new("1", "Project A"),
        Project::new("2", "Project B"),
        Project::new("3", "Project C"),
    ]
}

/// タイマー開始時に入力されるタスク情報。検証前の生の文字列を保持する。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskInput {
    pub task_name: String,
    pub task_type: String,
    pub project_id: String,
}

impl TaskInput {
    pub fn new(task_name: &str, task_type: &str, project_id: &str) -> Self {
        Self {
            task_name: task_name.to_string(),
            task_type: task_type.to_string(),
            project_id: project_id.to_string(),
        }
    }
}

/// 検証済みのタスク情報。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidTask {
    pub task_name: String,
    pub task_type: TaskType,
    pub project_id: String,
}

/// タイムエントリー。
///
/// `duration`はミリ秒で、計測中は更新され、停止後は`end_time - start_time`で固定される。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: EntryId,
    pub task_name: String,
    pub task_type: TaskType,
    pub project_id: String,
    pub owner_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: i64,
}
