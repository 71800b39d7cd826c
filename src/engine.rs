//! Engine driver
//!
//! Runs the configured GNU Backgammon binary once per position. The request
//! travels as a JSON file whose path is handed to the bundled analysis
//! script through the environment; the script writes a JSON response file
//! with the ranked candidate moves. Engines that cannot be launched yield
//! `engine_available = false` and callers skip the position.
//!
//! The engine is not safe to run concurrently, so invocations are
//! serialized behind a mutex in addition to the crawl queue's single-slot
//! discipline.

use std::path::PathBuf;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::board::moves::{parse_move_text, MovePart};
use crate::board::Dice;
use crate::error::Result;

/// Request handed to the engine script. `match_id` carries the full
/// `positionId:matchId` pair; `dice` overrides the roll when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineRequest {
    pub match_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dice: Option<Dice>,
}

impl EngineRequest {
    pub fn for_position(gnu_id: &str, dice: Option<Dice>) -> Self {
        Self {
            match_id: gnu_id.to_string(),
            position_id: None,
            position_index: None,
            dice,
        }
    }
}

/// One ranked candidate move. `parts` is derived from the move text with
/// shorthand expanded; it never crosses the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMove {
    #[serde(rename = "move")]
    pub move_text: String,
    #[serde(skip)]
    pub parts: Vec<MovePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mwc: Option<f64>,
}

impl CandidateMove {
    /// Build a candidate from engine output, expanding shorthand and
    /// scaling a percent mwc into 0..1. Equity is preferred for ranking.
    pub fn normalized(move_text: &str, equity: Option<f64>, mwc: Option<f64>) -> Self {
        let mwc = mwc.map(|m| if m > 1.0 { m / 100.0 } else { m });
        Self {
            parts: parse_move_text(move_text),
            move_text: move_text.trim().to_string(),
            equity,
            mwc,
        }
    }

    /// Value used to compare candidates: equity when present, else mwc.
    pub fn ranking_value(&self) -> Option<f64> {
        self.equity.or(self.mwc)
    }
}

/// Result of one engine invocation, best candidate first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineAnalysis {
    pub engine_available: bool,
    pub moves: Vec<CandidateMove>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl EngineAnalysis {
    pub fn unavailable() -> Self {
        Self {
            engine_available: false,
            moves: Vec::new(),
            raw: None,
        }
    }
}

/// The seam between the analyzer and the engine process.
#[async_trait]
pub trait MoveEngine: Send + Sync {
    async fn analyze(&self, request: &EngineRequest) -> Result<EngineAnalysis>;
}

/// Response file written by the bundled script.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptResponse {
    #[serde(default)]
    engine_available: bool,
    #[serde(default)]
    moves: Vec<ScriptMove>,
    #[serde(default)]
    raw: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScriptMove {
    #[serde(rename = "move")]
    move_text: String,
    #[serde(default)]
    equity: Option<f64>,
    #[serde(default)]
    mwc: Option<f64>,
}

/// Driver for the GNU Backgammon child process.
pub struct GnubgDriver {
    executable: Option<PathBuf>,
    script: PathBuf,
    invocation: tokio::sync::Mutex<()>,
}

impl GnubgDriver {
    pub fn new(executable: Option<PathBuf>, script: PathBuf) -> Self {
        Self {
            executable,
            script,
            invocation: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl MoveEngine for GnubgDriver {
    async fn analyze(&self, request: &EngineRequest) -> Result<EngineAnalysis> {
        let Some(executable) = &self.executable else {
            debug!("engine executable not configured, skipping analysis");
            return Ok(EngineAnalysis::unavailable());
        };

        let _serial = self.invocation.lock().await;

        let workdir = tempfile::tempdir()?;
        let input_path = workdir.path().join("request.json");
        let output_path = workdir.path().join("response.json");
        std::fs::write(&input_path, serde_json::to_vec(request)?)?;

        let output = match Command::new(executable)
            .arg("-t")
            .arg("-q")
            .arg("-p")
            .arg(&self.script)
            .env("GNUBG_INPUT_JSON", &input_path)
            .env("GNUBG_OUTPUT_JSON", &output_path)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, executable = %executable.display(), "failed to launch engine");
                return Ok(EngineAnalysis::unavailable());
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        let mut analysis = match std::fs::read_to_string(&output_path) {
            Ok(body) => match serde_json::from_str::<ScriptResponse>(&body) {
                Ok(response) => {
                    if let Some(error) = &response.error {
                        warn!(error = %error, "engine script reported an error");
                    }
                    EngineAnalysis {
                        engine_available: response.engine_available,
                        moves: response
                            .moves
                            .iter()
                            .map(|m| CandidateMove::normalized(&m.move_text, m.equity, m.mwc))
                            .collect(),
                        raw: response.raw,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "engine response file is not valid JSON");
                    EngineAnalysis::unavailable()
                }
            },
            Err(_) => EngineAnalysis::unavailable(),
        };

        if analysis.moves.is_empty() {
            let fallback = parse_hint_stdout(&stdout);
            if !fallback.is_empty() {
                debug!(count = fallback.len(), "using fallback stdout candidates");
                analysis.engine_available = true;
                analysis.moves = fallback;
            }
        }
        if analysis.raw.is_none() && !stdout.is_empty() {
            analysis.raw = Some(stdout);
        }

        Ok(analysis)
    }
}

static RANK_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)[.)]\s+(.*)$").expect("rank line regex"));
static EQ_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Eq\.\s*:\s*([+-]?\d+(?:\.\d+)?)").expect("equity marker regex"));
static MWC_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"MWC\s*:\s*([0-9.]+)\s*%").expect("mwc marker regex"));

/// Parse ranked candidates out of raw hint output when the script could not
/// produce structured JSON. Lines look like
/// `1. Cubeful 2-ply 8/3 6/3  Eq.: +0.087` or `2) 13/7 8/7  MWC: 51.3%`.
pub fn parse_hint_stdout(stdout: &str) -> Vec<CandidateMove> {
    let mut ranked: Vec<(u32, CandidateMove)> = Vec::new();

    for line in stdout.lines() {
        let Some(caps) = RANK_LINE.captures(line) else {
            continue;
        };
        let Ok(rank) = caps[1].parse::<u32>() else {
            continue;
        };
        let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");

        let (move_end, equity, mwc) = if let Some(m) = EQ_MARKER.captures(rest) {
            let value = m[1].parse::<f64>().ok();
            (m.get(0).unwrap().start(), value, None)
        } else if let Some(m) = MWC_MARKER.captures(rest) {
            let value = m[1].parse::<f64>().ok();
            (m.get(0).unwrap().start(), None, value)
        } else {
            continue;
        };

        let move_text = strip_evaluation_prefix(rest[..move_end].trim());
        if move_text.is_empty() {
            continue;
        }
        ranked.push((rank, CandidateMove::normalized(move_text, equity, mwc)));
    }

    ranked.sort_by_key(|(rank, _)| *rank);
    ranked.into_iter().map(|(_, c)| c).collect()
}

/// Drop the evaluation-type words the engine prints ahead of the move text.
fn strip_evaluation_prefix(text: &str) -> &str {
    let mut rest = text;
    loop {
        let mut advanced = false;
        for prefix in ["Cubeful", "Cubeless", "Rollout"] {
            if let Some(stripped) = rest.strip_prefix(prefix) {
                rest = stripped.trim_start();
                advanced = true;
            }
        }
        // Ply annotations like "2-ply" follow the evaluation type
        if let Some((head, tail)) = rest.split_once(char::is_whitespace) {
            if head.ends_with("-ply") {
                rest = tail.trim_start();
                advanced = true;
            }
        }
        if !advanced {
            return rest;
        }
    }
}
