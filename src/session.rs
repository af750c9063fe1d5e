//! Session controller: turns user intents into tree mutations and transport runs.
//!
//! All state transitions happen here on the caller's thread. Threads, the
//! transport, and rendering sit behind [`HostOps`].

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chat_transport::{
    ChatReply, ChatRequest, ChatRole, ChatTurn, ExchangeEntry, HistoryRecord, RunId, TokenUsage,
};
use message_tree::{
    Direction, FlatRecord, Message, MessageId, MessageTree, NewMessage, Role, SiblingPosition,
    TreeError,
};
use transcript_html::{TranscriptRecord, TranscriptRole};

use crate::commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use crate::config::ChatConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Idle,
    /// A reply is pending; it will be stored under `parent_id`.
    Sending {
        run_id: RunId,
        parent_id: MessageId,
    },
    Error(String),
    Exiting,
}

pub trait HostOps {
    fn start_run(&mut self, request: ChatRequest) -> Result<RunId, String>;
    fn cancel_run(&mut self, run_id: RunId);
    fn fetch_history(&mut self, session_id: &str) -> Result<Vec<HistoryRecord>, String>;
    fn list_models(&mut self) -> Result<Vec<String>, String>;
    fn exchanges(&mut self) -> Vec<ExchangeEntry>;
    fn clear_exchanges(&mut self);
    fn request_render(&mut self);
    fn request_stop(&mut self);
}

pub const NOTICE_CANCELLED: &str = "Request cancelled";
const NOTICE_NOTHING_TO_CANCEL: &str = "No request in flight";

#[derive(Debug, Clone)]
pub struct Session {
    pub mode: Mode,
    pub input: String,
    pub should_exit: bool,
    tree: MessageTree,
    notices: Vec<String>,
    system_prompt: Option<String>,
    config: ChatConfig,
    edit_target: Option<MessageId>,
    cancelling_run: Option<RunId>,
    /// Leaf shown before a pending regenerate; restored if it does not finish.
    regenerate_restore_leaf: Option<MessageId>,
    last_usage: Option<TokenUsage>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ChatConfig::default())
    }
}

impl Session {
    pub fn new(config: ChatConfig) -> Self {
        Self::with_system_prompt(config, None)
    }

    pub fn with_system_prompt(config: ChatConfig, system_prompt: Option<String>) -> Self {
        Self {
            mode: Mode::Idle,
            input: String::new(),
            should_exit: false,
            tree: MessageTree::new(),
            notices: Vec::new(),
            system_prompt: crate::config::sanitize_system_prompt(system_prompt),
            config,
            edit_target: None,
            cancelling_run: None,
            regenerate_restore_leaf: None,
            last_usage: None,
        }
    }

    pub fn tree(&self) -> &MessageTree {
        &self.tree
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    /// Returns and clears notices accumulated since the last call.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn edit_target(&self) -> Option<&MessageId> {
        self.edit_target.as_ref()
    }

    /// Usage reported with the most recent committed reply.
    pub fn last_usage(&self) -> Option<&TokenUsage> {
        self.last_usage.as_ref()
    }

    /// True while a reply is pending or a cancelled run has not wound down.
    pub fn is_busy(&self) -> bool {
        matches!(self.mode, Mode::Sending { .. }) || self.cancelling_run.is_some()
    }

    pub fn visible_chain(&self) -> Vec<Arc<Message>> {
        self.tree.visible_chain()
    }

    pub fn sibling_position(&self, id: &str) -> Option<SiblingPosition> {
        self.tree.sibling_position(id)
    }

    /// Message at 1-based `position` of the visible chain.
    pub fn message_at(&self, position: usize) -> Option<Arc<Message>> {
        position
            .checked_sub(1)
            .and_then(|index| self.visible_chain().get(index).cloned())
    }

    pub fn on_input_replace(&mut self, text: String) {
        self.input = text;
    }

    pub fn on_submit(&mut self, host: &mut dyn HostOps) {
        let submitted = std::mem::take(&mut self.input);
        let text = submitted.trim().to_string();

        if text.is_empty() {
            host.request_render();
            return;
        }

        if let Some(command) = parse_slash_command(&text) {
            self.apply_command(command, host);
            host.request_render();
            return;
        }

        if self.is_busy() {
            // Busy sends are dropped without touching the tree; the text stays in the input.
            self.input = submitted;
            tracing::debug!("submit ignored while a request is in flight");
            return;
        }

        if let Some(target) = self.edit_target.take() {
            self.edit_message(target.as_str(), &text, host);
            return;
        }

        let parent_id = self.tree.current_leaf_id().cloned();
        let user_id = match self
            .tree
            .append(NewMessage::user(text), parent_id.as_ref().map(MessageId::as_str))
        {
            Ok(user_id) => user_id,
            Err(error) => {
                self.report_tree_error("send message", &error);
                host.request_render();
                return;
            }
        };
        if let Err(error) = self.tree.set_current_leaf(user_id.as_str()) {
            self.report_tree_error("send message", &error);
            host.request_render();
            return;
        }

        self.dispatch_request(user_id, host);
        host.request_render();
    }

    pub fn on_cancel(&mut self, host: &mut dyn HostOps) {
        if self.cancelling_run.is_some() {
            host.request_render();
            return;
        }

        if let Mode::Sending { run_id, .. } = self.mode {
            self.cancelling_run = Some(run_id);
            self.mode = Mode::Idle;
            self.restore_leaf_after_regenerate();
            self.push_notice(NOTICE_CANCELLED);
            tracing::info!(run_id, "cancelling request");
            host.cancel_run(run_id);
        } else {
            self.push_notice(NOTICE_NOTHING_TO_CANCEL);
        }

        host.request_render();
    }

    /// Ctrl-C: cancels an in-flight request, otherwise quits.
    pub fn on_interrupt(&mut self, host: &mut dyn HostOps) {
        if matches!(self.mode, Mode::Sending { .. }) {
            self.on_cancel(host);
            return;
        }

        self.on_quit(host);
    }

    pub fn on_quit(&mut self, host: &mut dyn HostOps) {
        if let Mode::Sending { run_id, .. } = self.mode {
            self.cancelling_run = Some(run_id);
            host.cancel_run(run_id);
        }
        self.mode = Mode::Exiting;
        self.should_exit = true;
        host.request_stop();
        host.request_render();
    }

    /// Switches the branch at `id` and resumes at the deepest previously
    /// viewed message of the new branch. Returns the selected sibling.
    pub fn navigate(
        &mut self,
        id: &str,
        direction: Direction,
        host: &mut dyn HostOps,
    ) -> Option<MessageId> {
        let result = self.tree.switch_branch(id, direction);
        host.request_render();
        match result {
            Ok(sibling) => Some(sibling),
            Err(error) => {
                self.report_tree_error("switch branch", &error);
                None
            }
        }
    }

    /// Loads user message `id` into the input; the next submit sends an
    /// edited copy of it as a new branch.
    pub fn begin_edit(&mut self, id: &str, host: &mut dyn HostOps) {
        match self.tree.get(id) {
            Some(message) if message.role == Role::User => {
                self.input = message.content.clone();
                self.edit_target = Some(message.id.clone());
            }
            Some(message) => {
                let error = TreeError::NotUserMessage {
                    id: id.to_string(),
                    role: message.role,
                };
                self.report_tree_error("edit message", &error);
            }
            None => self.report_tree_error(
                "edit message",
                &TreeError::UnknownMessage { id: id.to_string() },
            ),
        }
        host.request_render();
    }

    pub fn cancel_edit(&mut self) {
        if self.edit_target.take().is_some() {
            self.input.clear();
        }
    }

    /// Stores an edited copy of user message `id` beside the original and
    /// sends it. No-op while busy.
    pub fn edit_message(&mut self, id: &str, new_content: &str, host: &mut dyn HostOps) {
        if self.is_busy() {
            tracing::debug!(id, "edit ignored while a request is in flight");
            return;
        }

        match self.tree.edit_message(id, new_content.trim()) {
            Ok(edited) => {
                tracing::info!(original = id, edited = %edited, "edited message");
                self.dispatch_request(edited, host);
            }
            Err(error) => self.report_tree_error("edit message", &error),
        }
        host.request_render();
    }

    /// Requests an alternative to assistant reply `id`; the new reply becomes
    /// its sibling. No-op while busy.
    pub fn regenerate(&mut self, id: &str, host: &mut dyn HostOps) {
        if self.is_busy() {
            tracing::debug!(id, "regenerate ignored while a request is in flight");
            return;
        }

        let parent_id = match self.tree.regeneration_parent(id) {
            Ok(parent_id) => parent_id,
            Err(error) => {
                self.report_tree_error("regenerate reply", &error);
                host.request_render();
                return;
            }
        };
        let previous_leaf = self.tree.current_leaf_id().cloned();
        if let Err(error) = self.tree.set_current_leaf(parent_id.as_str()) {
            self.report_tree_error("regenerate reply", &error);
            host.request_render();
            return;
        }

        tracing::info!(id, parent_id = %parent_id, "regenerating reply");
        self.regenerate_restore_leaf = previous_leaf;
        self.dispatch_request(parent_id, host);
        if !matches!(self.mode, Mode::Sending { .. }) {
            self.restore_leaf_after_regenerate();
        }
        host.request_render();
    }

    /// Replaces the tree with the turns decoded from `markup`. Returns the
    /// number of imported messages; an empty decode leaves the tree alone.
    pub fn import_html(&mut self, markup: &str, host: &mut dyn HostOps) -> usize {
        let records: Vec<FlatRecord> = transcript_html::decode(markup)
            .into_iter()
            .map(flat_record_from_transcript)
            .collect();

        if records.is_empty() {
            self.push_notice("No messages found to import");
            host.request_render();
            return 0;
        }

        let count = records.len();
        self.abandon_in_flight(host);
        self.tree.load_batch(records);
        self.push_notice(format!("Imported {count} messages"));
        tracing::info!(count, "imported transcript");
        host.request_render();
        count
    }

    /// Serializes the visible chain; system messages are left out.
    pub fn export_html(&self) -> String {
        let records: Vec<TranscriptRecord> = self
            .visible_chain()
            .iter()
            .map(|message| transcript_record_from_message(message))
            .collect();
        transcript_html::encode(&records)
    }

    /// History-sync overwrite: the tree becomes the linear chain of `records`.
    pub fn load_history(&mut self, records: Vec<HistoryRecord>, host: &mut dyn HostOps) {
        self.abandon_in_flight(host);
        let count = records.len();
        self.tree
            .load_batch(records.into_iter().map(flat_record_from_history));
        tracing::info!(count, "loaded history");
        host.request_render();
    }

    pub fn sync_history(&mut self, host: &mut dyn HostOps) {
        let session_id = self.config.session_id.clone();
        match host.fetch_history(&session_id) {
            Ok(records) => {
                let count = records.len();
                self.load_history(records, host);
                self.push_notice(format!("Synced {count} messages"));
            }
            Err(error) => self.push_notice(request_failed(&error)),
        }
        host.request_render();
    }

    pub fn on_run_finished(&mut self, run_id: RunId, reply: ChatReply) {
        if self.is_cancelling(run_id) {
            self.cancelling_run = None;
            tracing::debug!(run_id, "discarded reply of cancelled request");
            return;
        }

        let parent_id = match &self.mode {
            Mode::Sending {
                run_id: active,
                parent_id,
            } if *active == run_id => parent_id.clone(),
            _ => {
                tracing::debug!(run_id, "ignored reply of stale request");
                return;
            }
        };
        self.mode = Mode::Idle;
        self.regenerate_restore_leaf = None;

        let appended = self
            .tree
            .append(NewMessage::assistant(reply.reply), Some(parent_id.as_str()))
            .and_then(|id| self.tree.set_current_leaf(id.as_str()).map(|()| id));
        match appended {
            Ok(id) => {
                tracing::debug!(run_id, id = %id, "stored reply");
                self.last_usage = reply.usage;
            }
            Err(error) => self.report_tree_error("store reply", &error),
        }
    }

    pub fn on_run_failed(&mut self, run_id: RunId, error: &str) {
        if self.is_cancelling(run_id) {
            self.cancelling_run = None;
            return;
        }

        if !self.is_active_run(run_id) {
            return;
        }

        tracing::warn!(run_id, error, "request failed");
        self.mode = Mode::Error(error.to_string());
        self.restore_leaf_after_regenerate();
        self.push_notice(request_failed(error));
    }

    pub fn on_run_cancelled(&mut self, run_id: RunId) {
        if self.is_cancelling(run_id) {
            self.cancelling_run = None;
            return;
        }

        if self.is_active_run(run_id) {
            self.mode = Mode::Idle;
            self.restore_leaf_after_regenerate();
            self.push_notice(NOTICE_CANCELLED);
        }
    }

    fn dispatch_request(&mut self, user_id: MessageId, host: &mut dyn HostOps) {
        let chain = self.tree.reconstruct_chain(Some(user_id.as_str()));
        let Some((message, earlier)) = chain.split_last() else {
            return;
        };

        let request = ChatRequest::new(self.config.session_id.clone(), message.content.clone())
            .with_history(context_window(earlier, self.config.context_limit))
            .with_system_prompt(self.system_prompt.clone())
            .with_model(self.config.model.clone())
            .with_sampling(self.config.temperature, self.config.top_p)
            .with_auto_summary(self.config.enable_auto_summary);

        match host.start_run(request) {
            Ok(run_id) => {
                tracing::debug!(run_id, parent_id = %user_id, "request started");
                self.mode = Mode::Sending {
                    run_id,
                    parent_id: user_id,
                };
            }
            Err(error) => {
                self.mode = Mode::Error(error.clone());
                self.push_notice(request_failed(&error));
            }
        }
    }

    fn apply_command(&mut self, command: SlashCommand, host: &mut dyn HostOps) {
        match command {
            SlashCommand::Help => self.push_notice(HELP_TEXT),
            SlashCommand::Edit { position, text } => {
                if let Some(id) = self.id_at(position) {
                    self.edit_message(id.as_str(), &text, host);
                }
            }
            SlashCommand::Regenerate { position } => {
                if let Some(id) = self.id_at(position) {
                    self.regenerate(id.as_str(), host);
                }
            }
            SlashCommand::Previous { position } => {
                if let Some(id) = self.id_at(position) {
                    self.navigate(id.as_str(), Direction::Previous, host);
                }
            }
            SlashCommand::Next { position } => {
                if let Some(id) = self.id_at(position) {
                    self.navigate(id.as_str(), Direction::Next, host);
                }
            }
            SlashCommand::Import(path) => match fs::read_to_string(&path) {
                Ok(markup) => {
                    self.import_html(&markup, host);
                }
                Err(error) => {
                    self.push_notice(format!("Import failed: {}: {error}", path.display()))
                }
            },
            SlashCommand::Export(path) => self.export_to(&path),
            SlashCommand::Sync => self.sync_history(host),
            SlashCommand::System(prompt) => {
                self.system_prompt = crate::config::sanitize_system_prompt(prompt);
                let notice = if self.system_prompt.is_some() {
                    "System prompt set"
                } else {
                    "System prompt cleared"
                };
                self.push_notice(notice);
            }
            SlashCommand::Models => match host.list_models() {
                Ok(models) if models.is_empty() => self.push_notice("No models available"),
                Ok(models) => self.push_notice(format!("Models: {}", models.join(", "))),
                Err(error) => self.push_notice(request_failed(&error)),
            },
            SlashCommand::Logs => {
                let exchanges = host.exchanges();
                if exchanges.is_empty() {
                    self.push_notice("No exchanges logged");
                }
                for entry in &exchanges {
                    self.push_notice(describe_exchange(entry));
                }
            }
            SlashCommand::ClearLogs => {
                host.clear_exchanges();
                self.push_notice("Logs cleared");
            }
            SlashCommand::Save(path) => match self.tree.save_snapshot(&path) {
                Ok(()) => self.push_notice(format!("Saved tree to {}", path.display())),
                Err(error) => self.push_notice(format!("Save failed: {error}")),
            },
            SlashCommand::Load(path) => match MessageTree::load_snapshot(&path) {
                Ok(tree) => {
                    self.abandon_in_flight(host);
                    self.tree = tree;
                    self.push_notice(format!(
                        "Loaded {} messages from {}",
                        self.tree.len(),
                        path.display()
                    ));
                }
                Err(error) => self.push_notice(format!("Load failed: {error}")),
            },
            SlashCommand::Cancel => self.on_cancel(host),
            SlashCommand::Quit => self.on_quit(host),
            SlashCommand::Usage(usage) => self.push_notice(format!("Usage: {usage}")),
            SlashCommand::Unknown(command) => {
                self.push_notice(format!("Unknown command: {command}"))
            }
        }
    }

    fn export_to(&mut self, path: &Path) {
        let markup = self.export_html();
        match fs::write(path, markup) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "exported transcript");
                self.push_notice(format!("Exported transcript to {}", path.display()));
            }
            Err(error) => {
                self.push_notice(format!("Export failed: {}: {error}", path.display()))
            }
        }
    }

    fn id_at(&mut self, position: usize) -> Option<MessageId> {
        let id = self.message_at(position).map(|message| message.id.clone());
        if id.is_none() {
            self.push_notice(format!("No message at position {position}"));
        }
        id
    }

    /// Cancels a pending request before the tree is replaced underneath it.
    fn abandon_in_flight(&mut self, host: &mut dyn HostOps) {
        if let Mode::Sending { run_id, .. } = self.mode {
            self.cancelling_run = Some(run_id);
            self.mode = Mode::Idle;
            host.cancel_run(run_id);
        }
        self.edit_target = None;
        self.regenerate_restore_leaf = None;
    }

    #[cfg(test)]
    pub(crate) fn replace_tree_for_tests(&mut self, tree: MessageTree) {
        self.tree = tree;
    }

    /// Puts back the leaf a regenerate moved away from, so an unfinished
    /// regenerate leaves the previous reply visible.
    fn restore_leaf_after_regenerate(&mut self) {
        let Some(leaf) = self.regenerate_restore_leaf.take() else {
            return;
        };
        if let Err(error) = self.tree.set_current_leaf(leaf.as_str()) {
            self.report_tree_error("restore previous reply", &error);
        }
    }

    fn is_active_run(&self, run_id: RunId) -> bool {
        matches!(self.mode, Mode::Sending { run_id: active, .. } if active == run_id)
    }

    fn is_cancelling(&self, run_id: RunId) -> bool {
        self.cancelling_run == Some(run_id)
    }

    fn report_tree_error(&mut self, action: &str, error: &TreeError) {
        tracing::error!(%error, action, "tree operation rejected");
        self.push_notice(format!("Cannot {action}: {error}"));
    }

    fn push_notice(&mut self, notice: impl Into<String>) {
        self.notices.push(notice.into());
    }
}

/// The last `limit` turns before the message being sent, oldest first.
fn context_window(earlier: &[Arc<Message>], limit: usize) -> Vec<ChatTurn> {
    earlier
        .iter()
        .skip(earlier.len().saturating_sub(limit))
        .map(|message| ChatTurn::new(chat_role(message.role), message.content.clone()))
        .collect()
}

fn request_failed(error: &str) -> String {
    format!("Request failed: {error}")
}

fn describe_exchange(entry: &ExchangeEntry) -> String {
    let status = entry
        .response_status
        .map_or_else(|| "-".to_string(), |status| status.to_string());
    let mut line = format!(
        "#{} {} {} {} -> {status}",
        entry.id, entry.timestamp, entry.method, entry.url
    );
    if let Some(tokens) = &entry.tokens {
        line.push_str(&format!(" [{tokens}]"));
    }
    line
}

fn chat_role(role: Role) -> ChatRole {
    match role {
        Role::User => ChatRole::User,
        Role::Assistant => ChatRole::Assistant,
        Role::System => ChatRole::System,
    }
}

fn flat_record_from_history(record: HistoryRecord) -> FlatRecord {
    let role = match record.role {
        ChatRole::User => Role::User,
        ChatRole::Assistant => Role::Assistant,
        ChatRole::System => Role::System,
    };
    FlatRecord::new(record.id, role, record.content)
}

fn flat_record_from_transcript(record: TranscriptRecord) -> FlatRecord {
    let role = match record.role {
        TranscriptRole::User => Role::User,
        TranscriptRole::Assistant => Role::Assistant,
        TranscriptRole::System => Role::System,
    };
    FlatRecord::new(record.id, role, record.content)
}

fn transcript_record_from_message(message: &Message) -> TranscriptRecord {
    let role = match message.role {
        Role::User => TranscriptRole::User,
        Role::Assistant => TranscriptRole::Assistant,
        Role::System => TranscriptRole::System,
    };
    TranscriptRecord::new(message.id.as_str(), role, message.content.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, role: Role, content: &str) -> Arc<Message> {
        Arc::new(Message {
            id: MessageId::from(id),
            role,
            content: content.to_string(),
            parent_id: None,
            children_ids: Vec::new(),
            selected_child_id: None,
            seq: 0,
            created_at: String::new(),
        })
    }

    #[test]
    fn context_window_keeps_most_recent_turns() {
        let earlier = vec![
            message("1", Role::User, "a"),
            message("2", Role::Assistant, "b"),
            message("3", Role::User, "c"),
        ];

        let window = context_window(&earlier, 2);

        assert_eq!(
            window,
            vec![
                ChatTurn::new(ChatRole::Assistant, "b"),
                ChatTurn::new(ChatRole::User, "c"),
            ]
        );
        assert_eq!(context_window(&earlier, 10).len(), 3);
    }

    #[test]
    fn exchange_lines_show_status_and_tokens() {
        let entry = ExchangeEntry {
            id: 4,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            method: "POST".to_string(),
            url: "http://backend/chat".to_string(),
            request_body: None,
            response_status: Some(200),
            response_body: String::new(),
            tokens: Some(TokenUsage {
                prompt_tokens: 1,
                completion_tokens: 2,
                total_tokens: 3,
                ..TokenUsage::default()
            }),
        };

        assert_eq!(
            describe_exchange(&entry),
            "#4 2024-01-01T00:00:00Z POST http://backend/chat -> 200 [prompt 1 / completion 2 / total 3]"
        );
    }
}
