use std::io::Write;
use std::ops::ControlFlow;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::auth::Authenticator;
use crate::command::{Command, HELP};
use crate::console::{ConsolePresenter, ConsoleText};
use crate::datetime;
use crate::report::format_duration;
use crate::session::Session;
use crate::ticker::TickSignal;
use crate::time_entry::ProjectCatalog;

/// `session`サブコマンドの引数。
#[derive(Debug, Default, clap::Args)]
pub struct SessionArgs {
    #[clap(
        long = "tick-ms",
        help = "Sets the interval in milliseconds for refreshing the running timer",
        parse(try_from_str = parse_tick),
    )]
    pub tick_ms: Option<u64>,

    #[clap(
        long = "auth-url",
        help = "Authenticates against the backend at this URL instead of the demo users"
    )]
    pub auth_url: Option<String>,
}

/// 対話形式でタイマーを操作するサブコマンド。
pub struct SessionCommand<'a, A: Authenticator> {
    authenticator: &'a A,
    catalog: ProjectCatalog,
    tick_period: Duration,
}

impl<'a, A: Authenticator> SessionCommand<'a, A> {
    /// 新しい`SessionCommand`を返す。
    ///
    /// # Arguments
    /// * `authenticator` - ログインに用いる認証方式
    /// * `catalog` - 選択可能なプロジェクトの一覧
    /// * `tick_period` - 計測中のタイマーを更新する間隔
    pub fn new(authenticator: &'a A, catalog: ProjectCatalog, tick_period: Duration) -> Self {
        Self {
            authenticator,
            catalog,
            tick_period,
        }
    }

    /// `session`サブコマンドの処理を行う。
    ///
    /// 入力が終了するか`quit`が入力されるまで、1行ずつコマンドを処理する。
    /// 終了時にはセッションを破棄する。
    ///
    /// # Arguments
    ///
    /// * `reader` - コマンドの入力元
    /// * `writer` - 結果の出力先
    pub async fn run<R, W>(&self, reader: R, writer: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut presenter = ConsoleText::new(writer, self.catalog.clone());
        let (tick_sender, mut tick_receiver) = mpsc::unbounded_channel();
        let mut lines = reader.lines();
        let mut session: Option<Session> = None;

        presenter.show_message("Time Management System. Type `help` for commands.")?;
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read command")? else {
                        break;
                    };
                    let command = Command::parse(&line);
                    let flow = self
                        .handle(command, &mut session, &tick_sender, &mut presenter)
                        .await?;
                    if flow.is_break() {
                        break;
                    }
                }
                Some(signal) = tick_receiver.recv() => {
                    if let Some(session) = session.as_mut() {
                        session.on_tick(signal, datetime::now());
                    }
                }
            }
        }

        if let Some(mut session) = session.take() {
            session.teardown();
        }
        info!("Session command finished");

        Ok(())
    }

    /// 1つのコマンドを処理する。
    async fn handle<P: ConsolePresenter>(
        &self,
        command: Command,
        session: &mut Option<Session>,
        tick_sender: &UnboundedSender<TickSignal>,
        presenter: &mut P,
    ) -> Result<ControlFlow<()>> {
        if session.is_none() && !command.allowed_without_session() {
            presenter.show_message("Please log in first")?;
            return Ok(ControlFlow::Continue(()));
        }

        match command {
            Command::Login { email, password } => {
                if let Some(current) = session.as_ref() {
                    let message = format!("Already logged in as {}", current.user().display_name);
                    presenter.show_message(&message)?;
                    return Ok(ControlFlow::Continue(()));
                }
                let user = match self.authenticator.authenticate(&email, &password).await {
                    Ok(user) => user,
                    Err(err) => {
                        warn!("Login failed for {}: {:#}", email, err);
                        presenter.show_message(&format!("Login failed: {:#}", err))?;
                        return Ok(ControlFlow::Continue(()));
                    }
                };
                match user {
                    Some(user) => {
                        let message = format!("Logged in as {} ({})", user.display_name, user.id);
                        *session = Some(Session::new(
                            user,
                            self.catalog.clone(),
                            self.tick_period,
                            tick_sender.clone(),
                        ));
                        presenter.show_message(&message)?;
                    }
                    None => {
                        warn!("Login failed for {}", email);
                        presenter.show_message("Invalid email or password")?;
                    }
                }
            }
            Command::Help => presenter.show_message(HELP)?,
            Command::Projects => presenter.show_projects()?,
            Command::Quit => return Ok(ControlFlow::Break(())),
            Command::Empty => {}
            Command::Invalid(usage) => presenter.show_message(usage)?,
            Command::Unknown(name) => {
                presenter.show_message(&format!("Unknown command: {}", name))?
            }
            Command::Logout => {
                if let Some(mut closed) = session.take() {
                    closed.teardown();
                }
                presenter.show_message("Logged out")?;
            }
            command => {
                let Some(current) = session.as_mut() else {
                    bail!("Command requires a session: {:?}", command);
                };
                self.handle_in_session(command, current, presenter)?;
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    /// ログイン中にだけ実行できるコマンドを処理する。
    fn handle_in_session<P: ConsolePresenter>(
        &self,
        command: Command,
        session: &mut Session,
        presenter: &mut P,
    ) -> Result<()> {
        let now = datetime::now();
        match command {
            Command::Start(input) => match session.start(&input, now) {
                Ok(entry) => {
                    let message = format!(
                        "Started: {} [{} / {}]",
                        entry.task_name,
                        entry.task_type.label(),
                        session.catalog().name_of(&entry.project_id)
                    );
                    presenter.show_message(&message)?;
                }
                Err(err) => presenter.show_message(&err.to_string())?,
            },
            Command::Stop => match session.stop(now) {
                Ok(entry) => {
                    let message = format!(
                        "Stopped: {} {}",
                        entry.task_name,
                        format_duration(entry.duration)
                    );
                    presenter.show_message(&message)?;
                }
                Err(err) => presenter.show_message(&err.to_string())?,
            },
            Command::Status => {
                let active = session.refresh_active(now);
                presenter.show_active(active)?;
            }
            Command::Entries => {
                session.refresh_active(now);
                presenter.show_time_entries(session.entries())?;
            }
            Command::Report => {
                let report = session.report(now);
                presenter.show_report(&report)?;
            }
            Command::Export => {
                session.refresh_active(now);
                let json = serde_json::to_string_pretty(session.entries())
                    .context("Failed to serialize time entries")?;
                presenter.show_message(&json)?;
            }
            other => bail!("Unexpected command in session: {:?}", other),
        }

        Ok(())
    }
}

/// 更新間隔をパースする。0は受け付けない。
fn parse_tick(s: &str) -> Result<u64> {
    let tick = s
        .parse::<u64>()
        .with_context(|| format!("Failed to parse tick interval: {}", s))?;
    if tick == 0 {
        bail!("Tick interval must be greater than 0");
    }

    Ok(tick)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::anyhow;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use tokio::io::{AsyncWriteExt, BufReader};
    use tokio::time::sleep;

    use super::{parse_tick, SessionCommand};
    use crate::auth::{InMemoryAuthenticator, MockAuthenticator, User};
    use crate::datetime::mock_datetime;
    use crate::time_entry::ProjectCatalog;

    /// 入力を流し込んで出力を返す。
    async fn run_with<A: crate::auth::Authenticator>(authenticator: &A, input: &str) -> String {
        mock_datetime::set_mock_time(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());
        let command = SessionCommand::new(
            authenticator,
            ProjectCatalog::default(),
            Duration::from_secs(60),
        );
        let mut writer = Vec::new();

        command
            .run(BufReader::new(input.as_bytes()), &mut writer)
            .await
            .unwrap();

        String::from_utf8(writer).unwrap()
    }

    #[tokio::test]
    async fn test_login_with_mock_authenticator() {
        let mut authenticator = MockAuthenticator::new();
        authenticator
            .expect_authenticate()
            .withf(|email, password| {
                email.to_string() == "user1@example.com" && password.to_string() == "wrong"
            })
            .times(1)
            .returning(|_, _| Ok(None));
        authenticator
            .expect_authenticate()
            .withf(|email, password| {
                email.to_string() == "user1@example.com" && password.to_string() == "password1"
            })
            .times(1)
            .returning(|email, _| {
                Ok(Some(User {
                    id: email.to_string(),
                    display_name: "User One".to_string(),
                }))
            });

        let output = run_with(
            &authenticator,
            "login user1@example.com wrong\nlogin user1@example.com password1\n",
        )
        .await;

        assert!(output.contains("Invalid email or password\n"));
        assert!(output.contains("Logged in as User One (user1@example.com)\n"));
    }

    #[tokio::test]
    async fn test_commands_require_login() {
        let mut authenticator = MockAuthenticator::new();
        authenticator.expect_authenticate().never();

        let output = run_with(&authenticator, "start coding 1 Design doc\nreport\nlogout\n").await;

        assert_eq!(output.matches("Please log in first\n").count(), 3);
    }

    #[tokio::test]
    async fn test_login_usage_and_unknown_command() {
        let output = run_with(
            &InMemoryAuthenticator::default(),
            "login user1@example.com\npause\n\nhelp\n",
        )
        .await;

        assert!(output.contains("Usage: login <email> <password>\n"));
        assert!(output.contains("Unknown command: pause\n"));
        assert!(output.contains("Commands:\n"));
    }

    /// 開始、停止、集計の一連の流れと、エラーメッセージの表示を確認する。
    #[tokio::test]
    async fn test_timer_flow() {
        let input = "\
login user1@example.com password1
stop
start
start analysis 9 Review
start coding 1 Design doc
start coding 2 Another
status
stop
status
report
entries
quit
start coding 1 Ignored
";
        let output = run_with(&InMemoryAuthenticator::default(), input).await;

        assert!(output.contains("No timer is running\n"));
        assert!(output.contains("Task name is required\n"));
        assert!(output.contains("Project selection is required\n"));
        assert!(!output.contains("Task type is required\n"));
        assert!(output.contains("Started: Design doc [Coding / Project A]\n"));
        assert!(output.contains("A timer is already running\n"));
        assert!(output.contains("Running: Design doc (Project A) 00:00:00\n"));
        assert!(output.contains("Stopped: Design doc 00:00:00\n"));
        assert!(output.contains("No active timer\n"));
        assert!(output.contains("Total Time Tracked: 00:00:00\n"));
        assert!(output.contains("  - Project C: 00:00:00\n"));
        assert!(output.contains("- Design doc [Coding] [Project A]"));
        assert!(!output.contains("Ignored"));
    }

    /// ログアウトするとエントリーが破棄される。
    #[tokio::test]
    async fn test_logout_discards_entries() {
        let input = "\
login user1@example.com password1
login user2@example.com password2
start other 3 Cleanup
logout
login user2@example.com password2
entries
export
";
        let output = run_with(&InMemoryAuthenticator::default(), input).await;

        assert!(output.contains("Already logged in as User One\n"));
        assert!(output.contains("Logged out\n"));
        assert!(output.contains("Logged in as User Two (user2@example.com)\n"));
        assert!(output.contains("No entries yet\n"));
        assert!(output.contains("[]\n"));
    }

    #[tokio::test]
    async fn test_export_entries_as_json() {
        let input = "\
login user1@example.com password1
start recruitment 2 Interview
export
";
        let output = run_with(&InMemoryAuthenticator::default(), input).await;

        assert!(output.contains(r#""taskName": "Interview""#));
        assert!(output.contains(r#""taskType": "recruitment""#));
        assert!(output.contains(r#""ownerId": "user1@example.com""#));
        assert!(output.contains(r#""endTime": null"#));
    }

    /// 認証でエラーが発生しても、入力の処理を続ける。
    #[tokio::test]
    async fn test_authentication_error_keeps_running() {
        let mut authenticator = MockAuthenticator::new();
        authenticator
            .expect_authenticate()
            .withf(|email, _| email.to_string() == "a")
            .times(1)
            .returning(|_, _| Err(anyhow!("backend 500")));
        authenticator
            .expect_authenticate()
            .withf(|email, _| email.to_string() == "user1@example.com")
            .times(1)
            .returning(|email, _| {
                Ok(Some(User {
                    id: email.to_string(),
                    display_name: "User One".to_string(),
                }))
            });

        let output = run_with(
            &authenticator,
            "login a b\nlogin user1@example.com password1\nstart coding 1 X\n",
        )
        .await;

        assert!(output.contains("Login failed: backend 500\n"));
        assert!(output.contains("Logged in as User One (user1@example.com)\n"));
        assert!(output.contains("Started: X [Coding / Project A]\n"));
    }

    /// 入力の合間に届いた通知が計測中のタイマーに反映され、
    /// ログアウト後の新しいセッションは前のセッションの値を引き継がない。
    #[tokio::test(start_paused = true)]
    async fn test_ticks_applied_between_commands() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        mock_datetime::set_mock_time(start);
        let authenticator = InMemoryAuthenticator::default();
        let command = SessionCommand::new(
            &authenticator,
            ProjectCatalog::default(),
            Duration::from_millis(100),
        );
        let (mut input, reader) = tokio::io::duplex(1024);
        let mut writer = Vec::new();

        let driver = async {
            input
                .write_all(b"login user1@example.com password1\nstart coding 1 Design doc\n")
                .await
                .unwrap();
            sleep(Duration::from_millis(10)).await;
            mock_datetime::advance_mock_time(5_000);
            sleep(Duration::from_millis(150)).await;
            // 時計を戻しても、通知で更新された値は減らない
            mock_datetime::set_mock_time(start);
            input.write_all(b"status\n").await.unwrap();
            sleep(Duration::from_millis(10)).await;

            input
                .write_all(b"logout\nlogin user1@example.com password1\nstart other 2 Cleanup\n")
                .await
                .unwrap();
            sleep(Duration::from_millis(10)).await;
            input.write_all(b"status\nentries\n").await.unwrap();
            sleep(Duration::from_millis(10)).await;
            drop(input);
        };
        let (result, _) = tokio::join!(command.run(BufReader::new(reader), &mut writer), driver);
        result.unwrap();

        let output = String::from_utf8(writer).unwrap();
        assert!(output.contains("Running: Design doc (Project A) 00:00:05\n"));
        assert!(output.contains("Logged out\n"));
        assert!(output.contains("Running: Cleanup (Project B) 00:00:00\n"));
        assert!(output.contains("- Cleanup [Other] [Project B]"));
        assert!(!output.contains("- Design doc"));
    }

    #[rstest]
    #[case::valid("250", Some(250))]
    #[case::zero("0", None)]
    #[case::negative("-1", None)]
    #[case::text("fast", None)]
    fn test_parse_tick(#[case] input: &str, #[case] expected: Option<u64>) {
        assert_eq!(parse_tick(input).ok(), expected);
    }
}
