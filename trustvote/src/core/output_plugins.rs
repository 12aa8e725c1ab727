/*!
Modular output system for live election updates
*/

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{error, info};
use trustvote_chain::{ContractEvent, OfficeResult};

use crate::core::{
    config::{OutputConfig, OutputPlugin, TerminalFormat},
    tracker::ResultUpdate,
};

pub type OutputResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Trait for output plugins
#[async_trait]
pub trait OutputHandler: Send {
    /// Name of the output handler
    fn name(&self) -> &'static str;

    /// Initialize the output handler (create files, check endpoints)
    async fn initialize(&mut self) -> OutputResult;

    /// Handle one contract event and the standing it produced
    async fn handle_update(&mut self, update: &ResultUpdate) -> OutputResult;

    /// Cleanup/finalize the output handler
    async fn finalize(&mut self) -> OutputResult;
}

/// Manages multiple output handlers
pub struct OutputManager {
    handlers: Vec<Box<dyn OutputHandler>>,
}

impl OutputManager {
    pub fn new(configs: &[OutputConfig]) -> Self {
        let handlers = configs
            .iter()
            .filter(|config| config.enabled)
            .map(|config| -> Box<dyn OutputHandler> {
                match &config.plugin {
                    OutputPlugin::Json { path } => Box::new(JsonOutputHandler::new(path.clone())),
                    OutputPlugin::Webhook { url, auth_token } => {
                        Box::new(WebhookOutputHandler::new(url.clone(), auth_token.clone()))
                    }
                    OutputPlugin::Terminal { format } => {
                        Box::new(TerminalOutputHandler::new(*format))
                    }
                }
            })
            .collect();
        Self::with_handlers(handlers)
    }

    pub fn with_handlers(handlers: Vec<Box<dyn OutputHandler>>) -> Self {
        info!("Initialized output manager with {} handlers", handlers.len());
        Self { handlers }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Initialize all handlers
    pub async fn initialize(&mut self) -> OutputResult {
        for handler in &mut self.handlers {
            handler.initialize().await?;
            info!("Initialized output handler: {}", handler.name());
        }
        Ok(())
    }

    /// Send an update to all enabled handlers. A failing handler does not
    /// stop the others.
    pub async fn handle_update(&mut self, update: &ResultUpdate) {
        for handler in &mut self.handlers {
            if let Err(e) = handler.handle_update(update).await {
                error!(
                    "Handler {} failed to process event at block {}: {}",
                    handler.name(),
                    update.record.block_number,
                    e
                );
            }
        }
    }

    /// Finalize all handlers
    pub async fn finalize(&mut self) -> OutputResult {
        for handler in &mut self.handlers {
            handler.finalize().await?;
        }
        Ok(())
    }
}

/// JSON lines file output handler, one compact object per update
pub struct JsonOutputHandler {
    file_path: PathBuf,
    file: Option<std::fs::File>,
}

impl JsonOutputHandler {
    pub fn new(file_path: PathBuf) -> Self {
        Self {
            file_path,
            file: None,
        }
    }
}

#[async_trait]
impl OutputHandler for JsonOutputHandler {
    fn name(&self) -> &'static str {
        "JSON"
    }

    async fn initialize(&mut self) -> OutputResult {
        if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.file = Some(OpenOptions::new().create(true).append(true).open(&self.file_path)?);
        Ok(())
    }

    async fn handle_update(&mut self, update: &ResultUpdate) -> OutputResult {
        if let Some(ref mut file) = self.file {
            let json_str = serde_json::to_string(update)?;
            writeln!(file, "{}", json_str)?;
            file.flush()?;
        }
        Ok(())
    }

    async fn finalize(&mut self) -> OutputResult {
        if let Some(ref mut file) = self.file {
            file.flush()?;
        }
        Ok(())
    }
}

/// Webhook output handler
pub struct WebhookOutputHandler {
    url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl WebhookOutputHandler {
    pub fn new(url: String, auth_token: Option<String>) -> Self {
        Self {
            url,
            auth_token,
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, payload: &impl serde::Serialize) -> OutputResult {
        let mut request = self.client.post(&self.url);

        if let Some(ref token) = self.auth_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.json(payload).send().await?;

        if !response.status().is_success() {
            return Err(format!("Webhook delivery failed: {}", response.status()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl OutputHandler for WebhookOutputHandler {
    fn name(&self) -> &'static str {
        "Webhook"
    }

    async fn initialize(&mut self) -> OutputResult {
        // Test the webhook endpoint
        let test_payload = serde_json::json!({
            "test": true,
            "timestamp": chrono::Utc::now().timestamp()
        });
        self.post(&test_payload).await
    }

    async fn handle_update(&mut self, update: &ResultUpdate) -> OutputResult {
        self.post(update).await
    }

    async fn finalize(&mut self) -> OutputResult {
        Ok(())
    }
}

/// Terminal output handler
pub struct TerminalOutputHandler {
    format: TerminalFormat,
}

impl TerminalOutputHandler {
    pub fn new(format: TerminalFormat) -> Self {
        Self { format }
    }

    pub fn format_update(&self, update: &ResultUpdate) -> String {
        match self.format {
            TerminalFormat::Plain => {
                let mut line = format!(
                    "[block {}] {}",
                    update.record.block_number,
                    describe_event(&update.record.event)
                );
                if let Some(standing) = &update.standing {
                    line.push_str(&format!("\n  {}", describe_standing(standing)));
                }
                line
            }
            TerminalFormat::Colored => {
                let mut line = format!(
                    "\x1b[36m⛓️ Block {}\x1b[0m {} {}",
                    update.record.block_number,
                    event_icon(&update.record.event),
                    describe_event(&update.record.event)
                );
                if let Some(standing) = &update.standing {
                    let standing = describe_standing(standing);
                    line.push_str(&format!("\n   \x1b[32m📊 {standing}\x1b[0m"));
                }
                line
            }
            TerminalFormat::Json => serde_json::to_string_pretty(update)
                .unwrap_or_else(|_| "JSON serialization failed".to_string()),
        }
    }
}

#[async_trait]
impl OutputHandler for TerminalOutputHandler {
    fn name(&self) -> &'static str {
        "Terminal"
    }

    async fn initialize(&mut self) -> OutputResult {
        match self.format {
            TerminalFormat::Colored => {
                println!("\x1b[32m🚀 TrustVote Results Watcher Started\x1b[0m")
            }
            _ => println!("🚀 TrustVote Results Watcher Started"),
        }
        Ok(())
    }

    async fn handle_update(&mut self, update: &ResultUpdate) -> OutputResult {
        println!("{}", self.format_update(update));
        Ok(())
    }

    async fn finalize(&mut self) -> OutputResult {
        match self.format {
            TerminalFormat::Colored => {
                println!("\x1b[33m🏁 TrustVote Results Watcher Stopped\x1b[0m")
            }
            _ => println!("🏁 TrustVote Results Watcher Stopped"),
        }
        Ok(())
    }
}

fn event_icon(event: &ContractEvent) -> &'static str {
    match event {
        ContractEvent::ElectionCreated { .. } => "🆕",
        ContractEvent::OfficeAdded { .. } => "🏛️",
        ContractEvent::CandidateAdded { .. } => "🙋",
        ContractEvent::VoteCast { .. } => "🗳️",
    }
}

pub fn describe_event(event: &ContractEvent) -> String {
    match event {
        ContractEvent::ElectionCreated { election, name, .. } => {
            format!("Election {election} created: {name}")
        }
        ContractEvent::OfficeAdded { election, office, name } => {
            format!("Office {office} added to election {election}: {name}")
        }
        ContractEvent::CandidateAdded {
            election,
            office,
            candidate,
            name,
        } => format!(
            "Candidate {candidate} added to office {office} of election {election}: {name}"
        ),
        ContractEvent::VoteCast {
            election,
            office,
            candidate,
            voter,
        } => format!(
            "Vote for candidate {candidate} in office {office} of election {election} by {voter}"
        ),
    }
}

pub fn describe_standing(office: &OfficeResult) -> String {
    let candidates: Vec<String> = office
        .candidates
        .iter()
        .map(|c| format!("{} {} ({}%)", c.name, c.votes, c.percentage))
        .collect();
    if candidates.is_empty() {
        format!("{}: no candidates", office.name)
    } else {
        format!("{}: {}", office.name, candidates.join(", "))
    }
}
