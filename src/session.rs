//! Interactive `explore` loop.
//!
//! Reads one command per line, re-runs the pipeline whenever the selection
//! changes and prints the result. Nothing a command does ends the session
//! except `quit` or end of input.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info, warn};

use crate::dashboard::Dashboard;
use crate::error::DashboardError;
use crate::filter::Selection;
use crate::output;
use crate::render::render_charts;

pub const HELP: &str = "\
Commands:
  lines                   list lines and journey counts
  select <L1,L2,...>      restrict to the given lines
  select all              select every line
  neutralize on|off       drop closure days and weekends
  show                    render the current selection again
  reload                  forget the loaded table and fetch it again
  help                    this text
  quit                    leave
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Lines,
    /// Replaces the selection. An empty list stays selected, and every pass
    /// warns until lines are chosen again.
    Select(Vec<String>),
    SelectAll,
    Neutralize(bool),
    Show,
    Reload,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(input: &str) -> std::result::Result<Self, Self::Err> {
        let input = input.trim();
        let (word, rest) = input
            .split_once(char::is_whitespace)
            .map_or((input, ""), |(w, r)| (w, r.trim()));

        match word.to_ascii_lowercase().as_str() {
            "lines" => Ok(Self::Lines),
            "select" if rest.eq_ignore_ascii_case("all") => Ok(Self::SelectAll),
            "select" => Ok(Self::Select(
                rest.split(',')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from)
                    .collect(),
            )),
            "neutralize" => match rest.to_ascii_lowercase().as_str() {
                "on" | "true" | "yes" => Ok(Self::Neutralize(true)),
                "off" | "false" | "no" => Ok(Self::Neutralize(false)),
                other => Err(format!("neutralize expects on or off, got '{other}'")),
            },
            "show" => Ok(Self::Show),
            "reload" => Ok(Self::Reload),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(format!("unknown command '{other}', type help")),
        }
    }
}

pub enum Reply {
    Text(String),
    Quit,
}

pub struct Session {
    dashboard: Dashboard,
    /// `None` selects every line of the current table.
    lines: Option<BTreeSet<String>>,
    neutralize: bool,
    out_dir: PathBuf,
}

impl Session {
    pub fn new(
        dashboard: Dashboard,
        lines: Option<Vec<String>>,
        neutralize: bool,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dashboard,
            lines: lines.map(|l| l.into_iter().collect()),
            neutralize,
            out_dir: out_dir.into(),
        }
    }

    pub async fn handle(&mut self, command: Command) -> Reply {
        let outcome = match command {
            Command::Quit => return Reply::Quit,
            Command::Help => Ok(HELP.to_string()),
            Command::Lines => self.list_lines().await,
            Command::SelectAll => {
                self.lines = None;
                self.render().await
            }
            Command::Select(lines) => {
                self.lines = Some(lines.into_iter().collect());
                self.render().await
            }
            Command::Neutralize(on) => {
                self.neutralize = on;
                self.render().await
            }
            Command::Show => self.render().await,
            Command::Reload => match self.dashboard.reload() {
                Ok(()) => self.render().await,
                Err(e) => Err(e.into()),
            },
        };
        Reply::Text(outcome.unwrap_or_else(describe_failure))
    }

    async fn selection(&mut self) -> Result<Selection> {
        Ok(match &self.lines {
            Some(lines) => Selection::new(lines.iter().cloned(), self.neutralize),
            None => Selection::all(&self.dashboard.table().await?, self.neutralize),
        })
    }

    async fn list_lines(&mut self) -> Result<String> {
        let table = self.dashboard.table().await?;
        Ok(format!("{}\n", output::lines_table(&table.line_counts())))
    }

    async fn render(&mut self) -> Result<String> {
        let selection = self.selection().await?;
        let report = self.dashboard.report(&selection).await?;
        let charts = render_charts(
            &report,
            &self.out_dir,
            self.dashboard.config().chaos_threshold_pct,
        )?;

        let mut text = output::render_text(&report);
        text.push_str(&format!(
            "\nCharts: {} and {}\n",
            charts.daily.display(),
            charts.hourly.display()
        ));
        Ok(text)
    }
}

fn describe_failure(e: anyhow::Error) -> String {
    match e.downcast_ref::<DashboardError>() {
        Some(user) if user.is_user_error() => {
            warn!(error = %user, "Nothing rendered");
            format!("warning: {user}\n")
        }
        _ => {
            error!(error = %e, "Command failed");
            format!("error: {e:#}\n")
        }
    }
}

/// Drives `session` from `input` until `quit` or end of input.
pub async fn run<R, W>(mut session: Session, input: R, mut out: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!(source = %session.dashboard.describe(), "Explore session started");
    out.write_all(HELP.as_bytes()).await?;
    if let Reply::Text(text) = session.handle(Command::Show).await {
        out.write_all(text.as_bytes()).await?;
    }

    let mut lines = input.lines();
    loop {
        out.write_all(b"> ").await?;
        out.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let text = match line.parse::<Command>() {
            Ok(command) => match session.handle(command).await {
                Reply::Quit => break,
                Reply::Text(text) => text,
            },
            Err(msg) => format!("{msg}\n"),
        };
        out.write_all(text.as_bytes()).await?;
    }

    out.write_all(b"\n").await?;
    out.flush().await?;
    info!("Explore session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DashboardConfig;
    use crate::dashboard::tests::{MemorySource, sample_rows};
    use crate::parser::{Decoded, ScanRequest};
    use crate::source::{SourceKey, TableSource};
    use async_trait::async_trait;

    fn session(dir: &std::path::Path) -> Session {
        let dashboard = Dashboard::new(
            Box::new(MemorySource(sample_rows())),
            DashboardConfig::default(),
            None,
        );
        Session::new(dashboard, None, false, dir)
    }

    async fn transcript(session: Session, input: &str) -> String {
        let mut out = Vec::new();
        run(session, input.as_bytes(), &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("lines".parse(), Ok(Command::Lines));
        assert_eq!("SELECT all".parse(), Ok(Command::SelectAll));
        assert_eq!(
            "select IC 1, IC 5".parse(),
            Ok(Command::Select(vec!["IC 1".into(), "IC 5".into()]))
        );
        assert_eq!("select".parse(), Ok(Command::Select(vec![])));
        assert_eq!("neutralize on".parse(), Ok(Command::Neutralize(true)));
        assert_eq!(" neutralize off ".parse(), Ok(Command::Neutralize(false)));
        assert_eq!("exit".parse(), Ok(Command::Quit));
        assert!("neutralize maybe".parse::<Command>().is_err());
        assert!("plot".parse::<Command>().is_err());
    }

    #[tokio::test]
    async fn test_session_renders_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        let text = transcript(session(dir.path()), "lines\nselect IC 5\nquit\n").await;

        assert!(text.contains("Analysis of 5 intercity journeys."));
        assert!(text.contains("Journeys"));
        assert!(text.contains("Analysis of 2 intercity journeys."));
        assert!(dir.path().join("daily_failure_rate.svg").exists());
    }

    #[tokio::test]
    async fn test_bad_input_does_not_end_session() {
        let dir = tempfile::tempdir().unwrap();
        let text = transcript(
            session(dir.path()),
            "select\nneutralize maybe\nfrobnicate\n\nneutralize on\nselect all\n",
        )
        .await;

        // both the bare select and the toggle after it render nothing
        assert_eq!(text.matches("warning: no lines selected").count(), 2);
        assert!(text.contains("neutralize expects on or off"));
        assert!(text.contains("unknown command 'frobnicate'"));
        let recovered = text.rsplit("> ").nth(1).unwrap();
        assert!(recovered.contains("Analysis of 4 intercity journeys."));
        assert!(recovered.contains("Neutralized"));
    }

    struct Unreachable;

    #[async_trait]
    impl TableSource for Unreachable {
        fn describe(&self) -> String {
            "https://invalid.example/x.parquet".into()
        }

        fn key(&self) -> SourceKey {
            SourceKey::new("remote", "https://invalid.example/x.parquet", None)
        }

        async fn load(&self, _scan: &ScanRequest) -> crate::error::Result<Decoded> {
            Err(DashboardError::acquisition(self.describe(), "connection refused"))
        }
    }

    #[tokio::test]
    async fn test_acquisition_failure_is_reported_and_survived() {
        let dir = tempfile::tempdir().unwrap();
        let dashboard = Dashboard::new(Box::new(Unreachable), DashboardConfig::default(), None);
        let text = transcript(
            Session::new(dashboard, None, false, dir.path()),
            "reload\nhelp\n",
        )
        .await;

        assert_eq!(text.matches("error: failed to acquire data").count(), 2);
        assert!(text.matches("Commands:").count() >= 2);
    }
}
