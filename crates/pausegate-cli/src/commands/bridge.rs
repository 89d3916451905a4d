//! JSON-lines bridge between a host process and the engine.
//!
//! The host writes one message per line on stdin:
//! `{"type":"foreground","package":"com.example.feed","window":"application"}`
//! `{"type":"outcome","package":"com.example.feed","periodic":false,"outcome":"cancel"}`
//! `{"type":"status"}`
//!
//! The engine answers with events on stdout: `show_pause`, `dismiss`,
//! `launch`, `status` and `error`.

use anyhow::Result;
use pausegate_core::{
    spawn_engine, AppLauncher, Collaborators, EngineConfig, EngineError, EngineHandle,
    EngineStatus, ForegroundSignal, PauseOutcome, PauseRequest, PauseSurface, SpawnedEngine,
    SystemClock, WindowKind,
};
use pausegate_storage::Database;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HostMessage {
    Foreground {
        package: Option<String>,
        #[serde(default)]
        window: Option<WindowKind>,
    },
    Outcome {
        package: String,
        #[serde(default)]
        periodic: bool,
        outcome: PauseOutcome,
    },
    Status,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum HostEvent<'a> {
    ShowPause {
        #[serde(flatten)]
        request: &'a PauseRequest,
    },
    Dismiss {
        session_id: Uuid,
    },
    Launch {
        package: &'a str,
    },
    Status {
        #[serde(flatten)]
        status: &'a EngineStatus,
    },
    Error {
        message: String,
    },
}

/// Writes one JSON event per line and doubles as pause surface and launcher
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn emit(&self, event: &HostEvent<'_>) -> Result<()> {
        let line = serde_json::to_string(event)?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow::anyhow!("Output lock poisoned"))?;
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }

    fn emit_logged(&self, event: &HostEvent<'_>) -> bool {
        match self.emit(event) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to write event to host: {e}");
                false
            }
        }
    }
}

impl<W: Write + Send> PauseSurface for JsonLinesSink<W> {
    fn show(&self, request: &PauseRequest) {
        self.emit_logged(&HostEvent::ShowPause { request });
    }

    fn dismiss(&self, session_id: Uuid) {
        self.emit_logged(&HostEvent::Dismiss { session_id });
    }
}

impl<W: Write + Send> AppLauncher for JsonLinesSink<W> {
    fn launch(&self, package: &str) -> bool {
        self.emit_logged(&HostEvent::Launch { package })
    }
}

/// Run recovery, then pump stdin into the engine until EOF or Ctrl-C
pub async fn run_bridge(db_path: Option<PathBuf>, config_path: &Path) -> Result<()> {
    let config = EngineConfig::load(config_path)?;
    let db = Arc::new(Database::new(db_path)?);
    let sink = Arc::new(JsonLinesSink::new(std::io::stdout()));
    let deps = Collaborators::with_database(db, sink.clone(), sink.clone(), Arc::new(SystemClock));

    let SpawnedEngine {
        handle,
        recovery,
        task,
    } = spawn_engine(config, deps)?;
    if let Some(package) = &recovery.abandoned {
        log::info!("Next entry into {package} will pause (unresolved pause before restart)");
    }
    log::info!("Engine ready, reading signals from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    log::info!("Host closed stdin");
                    break;
                };
                handle_line(&handle, sink.as_ref(), &line).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
        }
    }

    handle.shutdown();
    task.await?;
    Ok(())
}

/// Feed one input line to the engine. Only a stopped engine is fatal.
async fn handle_line<W: Write + Send>(
    handle: &EngineHandle,
    sink: &JsonLinesSink<W>,
    line: &str,
) -> Result<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }

    let message: HostMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            log::warn!("Ignoring malformed host message: {e}");
            sink.emit_logged(&HostEvent::Error {
                message: format!("malformed message: {e}"),
            });
            return Ok(());
        }
    };

    let result = match message {
        HostMessage::Foreground { package, window } => handle
            .foreground_changed(ForegroundSignal { package, window })
            .await
            .map(|decision| log::debug!("{decision:?}")),
        HostMessage::Outcome {
            package,
            periodic,
            outcome,
        } => handle
            .pause_outcome(&package, periodic, outcome)
            .await
            .map(|effect| log::debug!("{effect:?}")),
        HostMessage::Status => handle.status().await.map(|status| {
            sink.emit_logged(&HostEvent::Status { status: &status });
        }),
    };

    match result {
        Ok(()) => Ok(()),
        Err(EngineError::RuntimeStopped) => Err(EngineError::RuntimeStopped.into()),
        Err(e) => {
            sink.emit_logged(&HostEvent::Error {
                message: e.to_string(),
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(sink: &JsonLinesSink<Vec<u8>>) -> Vec<serde_json::Value> {
        let out = sink.out.lock().unwrap();
        String::from_utf8(out.clone())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_parse_foreground_message() {
        let message: HostMessage = serde_json::from_str(
            r#"{"type":"foreground","package":"com.example.feed","window":"input_method"}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            HostMessage::Foreground {
                package: Some(String::from("com.example.feed")),
                window: Some(WindowKind::InputMethod),
            }
        );
    }

    #[test]
    fn test_parse_outcome_defaults_to_initial() {
        let message: HostMessage = serde_json::from_str(
            r#"{"type":"outcome","package":"com.example.feed","outcome":"continue"}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            HostMessage::Outcome {
                package: String::from("com.example.feed"),
                periodic: false,
                outcome: PauseOutcome::Continue,
            }
        );
    }

    #[test]
    fn test_show_pause_event_is_flat() {
        let sink = JsonLinesSink::new(Vec::new());
        let request = PauseRequest {
            session_id: Uuid::nil(),
            package: String::from("com.example.feed"),
            periodic: true,
            duration_secs: 15,
            requested_at_ms: 1_000,
            usage: None,
        };
        sink.show(&request);
        assert!(sink.launch("com.example.feed"));

        let events = lines(&sink);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event"], "show_pause");
        assert_eq!(events[0]["package"], "com.example.feed");
        assert_eq!(events[0]["periodic"], true);
        assert_eq!(events[1]["event"], "launch");
    }

    #[tokio::test]
    async fn test_bridge_reports_pause_and_errors() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.upsert_monitored_package(&pausegate_storage::MonitoredPackage::new(String::from(
            "com.example.feed",
        )))
        .unwrap();
        let sink = Arc::new(JsonLinesSink::new(Vec::new()));
        let deps =
            Collaborators::with_database(db, sink.clone(), sink.clone(), Arc::new(SystemClock));
        let engine = spawn_engine(EngineConfig::default(), deps).unwrap();

        handle_line(&engine.handle, sink.as_ref(), "not json").await.unwrap();
        handle_line(
            &engine.handle,
            sink.as_ref(),
            r#"{"type":"foreground","package":"com.example.feed"}"#,
        )
        .await
        .unwrap();
        handle_line(&engine.handle, sink.as_ref(), "   ").await.unwrap();
        handle_line(&engine.handle, sink.as_ref(), r#"{"type":"status"}"#)
            .await
            .unwrap();

        let events = lines(&sink);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["event"], "error");
        assert_eq!(events[1]["event"], "show_pause");
        assert_eq!(events[2]["event"], "status");
        assert_eq!(events[2]["foreground"], "com.example.feed");
    }
}
