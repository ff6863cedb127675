//! Line-oriented terminal front end over a [`ChatSession`].

use std::borrow::Cow::{self, Borrowed, Owned};
use std::path::{Path, PathBuf};

use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tokio::runtime::Runtime;

use crate::commands::{ChatSession, OpenedDocument, Reply};
use crate::error::ChatError;
use crate::llm::ChatModel;

const COMMANDS: [&str; 6] = ["/open", "/use", "/docs", "/history", "/help", "/quit"];

const HELP: &str = "\
/open PATH    open a .txt, .pdf, .docx, .csv, .xlsx, .jpg or .png file
/use NAME     switch the active document
/docs         list open documents
/history      show the chat history for the active document
/help         show this message
/quit         exit
Anything else is a question about the active document.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Open(PathBuf),
    Use(String),
    Docs,
    History,
    Help,
    Quit,
    Ask(String),
    /// A slash command that could not be understood, with the reason.
    Invalid(String),
}

impl ReplCommand {
    /// `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if !line.starts_with('/') {
            return Some(ReplCommand::Ask(line.to_string()));
        }

        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (line, ""),
        };
        let command = match (name, arg.is_empty()) {
            ("/open", false) => ReplCommand::Open(PathBuf::from(arg)),
            ("/open", true) => ReplCommand::Invalid("Usage: /open PATH".into()),
            ("/use", false) => ReplCommand::Use(arg.to_string()),
            ("/use", true) => ReplCommand::Invalid("Usage: /use NAME".into()),
            ("/docs", _) => ReplCommand::Docs,
            ("/history", _) => ReplCommand::History,
            ("/help", _) => ReplCommand::Help,
            ("/quit" | "/exit", _) => ReplCommand::Quit,
            (other, _) => ReplCommand::Invalid(format!("Unknown command: {}", other)),
        };
        Some(command)
    }
}

/// Completion and hints for slash commands.
#[derive(Clone, Default)]
struct CommandHelper;

impl Helper for CommandHelper {}

impl Completer for CommandHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return Ok((0, vec![]));
        }
        let candidates = COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(line))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Highlighter for CommandHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for CommandHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return None;
        }
        COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Validator for CommandHelper {}

pub struct Repl<M> {
    session: ChatSession<M>,
    runtime: Runtime,
    active: Option<String>,
}

impl<M: ChatModel> Repl<M> {
    pub fn new(session: ChatSession<M>, runtime: Runtime) -> Self {
        Self {
            session,
            runtime,
            active: None,
        }
    }

    /// Open a file and make it the active document. Failures are printed.
    pub fn open(&mut self, path: &Path) {
        match self.runtime.block_on(self.session.open(path)) {
            Ok(opened) => {
                print_opened(&opened);
                self.active = Some(opened.name);
            }
            Err(e) => print_error(&e),
        }
    }

    pub fn run(mut self) -> anyhow::Result<()> {
        let mut rl: Editor<CommandHelper, DefaultHistory> = Editor::new()?;
        rl.set_helper(Some(CommandHelper));

        println!("{}", "=== docchat ===".bright_magenta().bold());
        println!(
            "{}",
            format!("Model: {}. Type /help for commands.", self.session.model_id()).bright_black()
        );
        println!();

        loop {
            let prompt = match &self.active {
                Some(name) => format!("{}> ", name),
                None => "> ".to_string(),
            };
            match rl.readline(&prompt) {
                Ok(line) => {
                    let Some(command) = ReplCommand::parse(&line) else {
                        continue;
                    };
                    let _ = rl.add_history_entry(line.as_str());
                    if command == ReplCommand::Quit {
                        println!("{}", "Goodbye!".bright_green());
                        break;
                    }
                    self.dispatch(command);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "CTRL-C detected. Type /quit to exit.".yellow());
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("{}", format!("Error: {:?}", err).red());
                    break;
                }
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, command: ReplCommand) {
        match command {
            ReplCommand::Open(path) => self.open(&path),
            ReplCommand::Use(name) => match self.session.document(&name) {
                Ok(_) => self.active = Some(name),
                Err(e) => print_error(&e),
            },
            ReplCommand::Docs => self.print_documents(),
            ReplCommand::History => self.print_history(),
            ReplCommand::Help => println!("{}", HELP.bright_black()),
            ReplCommand::Ask(query) => self.ask(&query),
            ReplCommand::Invalid(message) => println!("{}", message.yellow()),
            ReplCommand::Quit => {}
        }
    }

    fn ask(&self, query: &str) {
        let Some(document) = self.active.as_deref() else {
            println!("{}", "Please upload a document first (/open PATH).".yellow());
            return;
        };
        match self.runtime.block_on(self.session.ask(document, query)) {
            Ok(Reply::Text(text)) => {
                for line in text.lines() {
                    println!("{}", line.bright_blue());
                }
            }
            Ok(Reply::Chart { code, path }) => {
                println!("{}", code.bright_black());
                println!(
                    "{}",
                    format!("Chart written to {}", path.display()).bright_green()
                );
            }
            Err(e) => print_error(&e),
        }
    }

    fn print_documents(&self) {
        let documents = match self.session.documents() {
            Ok(documents) => documents,
            Err(e) => return print_error(&e),
        };
        if documents.is_empty() {
            println!("{}", "No documents open.".bright_black());
        }
        for (name, content, turns) in documents {
            let marker = if self.active.as_deref() == Some(name) { "*" } else { " " };
            println!(
                "{} {} ({}, {} turns)",
                marker,
                name.bold(),
                content.kind_label(),
                turns
            );
        }
    }

    fn print_history(&self) {
        let Some(document) = self.active.as_deref() else {
            println!("{}", "No active document.".yellow());
            return;
        };
        match self.session.history(document) {
            Ok(turns) if turns.is_empty() => println!("{}", "No history yet.".bright_black()),
            Ok(turns) => {
                for turn in turns {
                    println!("{}", format!("User: {}", turn.query).green());
                    println!("{}", format!("Bot: {}", turn.response).bright_blue());
                }
            }
            Err(e) => print_error(&e),
        }
    }
}

fn print_opened(opened: &OpenedDocument) {
    println!(
        "{}",
        format!("Opened {} ({})", opened.name, opened.kind).bright_green()
    );
    println!("{}", opened.preview.bright_black());
    match &opened.description {
        Some(Ok(description)) => println!("{}", description.bright_blue()),
        Some(Err(e)) => print_error(e),
        None => {}
    }
}

fn print_error(error: &ChatError) {
    eprintln!("{}", error.to_string().red());
    if let ChatError::NoCodeFound { response } = error {
        eprintln!("{}", response.bright_black());
    }
}
