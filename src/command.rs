use crate::time_entry::TaskInput;

/// コンソールから入力されるコマンド。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Login { email: String, password: String },
    Logout,
    Start(TaskInput),
    Stop,
    Status,
    Entries,
    Report,
    Export,
    Projects,
    Help,
    Quit,
    /// 空行。何もしない。
    Empty,
    /// 引数が不足している。使い方を保持する。
    Invalid(&'static str),
    Unknown(String),
}

pub const LOGIN_USAGE: &str = "Usage: login <email> <password>";

pub const HELP: &str = "\
Commands:
  login <email> <password>                 Sign in
  logout                                   Sign out and discard all entries
  start <task type> <project id> <name>    Start a timer
  stop                                     Stop the running timer
  status                                   Show the running timer
  entries                                  List recent entries
  report                                   Show time by project
  export                                   Print entries as JSON
  projects                                 List projects and task types
  help                                     Show this help
  quit                                     Exit";

impl Command {
    /// 1行の入力をコマンドに変換する。
    ///
    /// `start`の引数が不足している場合は空文字として扱い、検証に任せる。
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Command::Empty;
        };

        match name {
            "login" => match (words.next(), words.next()) {
                (Some(email), Some(password)) => Command::Login {
                    email: email.to_string(),
                    password: password.to_string(),
                },
                _ => Command::Invalid(LOGIN_USAGE),
            },
            "logout" => Command::Logout,
            "start" => {
                let task_type = words.next().unwrap_or_default();
                let project_id = words.next().unwrap_or_default();
                let task_name = words.collect::<Vec<_>>().join(" ");
                Command::Start(TaskInput::new(&task_name, task_type, project_id))
            }
            "stop" => Command::Stop,
            "status" => Command::Status,
            "entries" => Command::Entries,
            "report" => Command::Report,
            "export" => Command::Export,
            "projects" => Command::Projects,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }

    /// ログインしていなくても実行できるかどうかを返す。
    pub fn allowed_without_session(&self) -> bool {
        matches!(
            self,
            Command::Login { .. }
                | Command::Projects
                | Command::Help
                | Command::Quit
                | Command::Empty
                | Command::Invalid(_)
                | Command::Unknown(_)
        )
    }
}
