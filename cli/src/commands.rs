//! Command handler for CLI

use crate::ui;
use anyhow::{bail, Result};
use colored::Colorize;
use subchat_core::peer::Peer;
use subchat_core::types::ContentItem;

const SPACE_USAGE: &str = "Usage: space <name> | space create <name> [description] -- <text>";

/// Arguments of the `space` command
#[derive(Debug, PartialEq, Eq)]
enum SpaceCommand<'a> {
    Switch(&'a str),
    Create {
        name: &'a str,
        description: Option<&'a str>,
        text: &'a str,
    },
}

/// `create` is reserved as the first word, so a bare `space create` is a usage error
fn parse_space_args(args: &str) -> Result<SpaceCommand<'_>> {
    let args = args.trim();
    let definition = match args.split_once(char::is_whitespace) {
        _ if args.is_empty() => bail!(SPACE_USAGE),
        Some(("create", definition)) => definition.trim(),
        None if args == "create" => "",
        _ => return Ok(SpaceCommand::Switch(args)),
    };

    let (head, text) = match definition.split_once("--") {
        Some((head, text)) => (head.trim(), text.trim()),
        None => (definition, ""),
    };
    if head.is_empty() {
        bail!(SPACE_USAGE);
    }
    if text.is_empty() {
        bail!("A new space needs a first post: space create <name> [description] -- <text>");
    }
    let (name, description) = match head.split_once(char::is_whitespace) {
        Some((name, description)) => (name, Some(description.trim())),
        None => (head, None),
    };
    Ok(SpaceCommand::Create { name, description, text })
}

pub struct CommandHandler {
    peer: Peer,
}

impl CommandHandler {
    pub fn new(peer: Peer) -> Self {
        Self { peer }
    }

    pub fn into_peer(self) -> Peer {
        self.peer
    }

    /// Current space, for the prompt
    pub async fn space(&self) -> String {
        self.peer.session().lock().await.space().to_string()
    }

    pub async fn handle_command(&mut self, input: &str) -> Result<()> {
        let (command, rest) = match input.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (input, ""),
        };

        match command {
            "whoami" => self.cmd_whoami().await,
            "version" | "about" => self.cmd_version(),
            "relay" => self.cmd_relay(),
            "space" => self.cmd_space(rest).await,
            "post" | "send" => self.cmd_post(rest).await,
            "posts" => self.cmd_posts().await,
            _ => {
                ui::print_error(&format!("Unknown command: {}", command));
                ui::print_info("Type 'help' for available commands");
                Ok(())
            }
        }
    }

    fn cmd_version(&self) -> Result<()> {
        println!();
        println!("{}", format!("  {}", subchat_core::version_string()).bright_cyan().bold());
        println!("{} {}", "Protocol Version:".bright_green(), subchat_core::PROTOCOL_VERSION);
        println!("{} {}", "Build:".bright_green(), subchat_core::version::BUILD_PROFILE);
        println!();
        Ok(())
    }

    async fn cmd_whoami(&self) -> Result<()> {
        let session = self.peer.session().lock().await;
        println!();
        println!("{} {}", "Name:".bright_green(), session.display_name().bright_cyan());
        println!("{} {}", "Key:".bright_green(), session.peer_key());
        println!("{} {}", "Space:".bright_green(), session.space());
        println!();
        Ok(())
    }

    fn cmd_relay(&self) -> Result<()> {
        println!("{} {}", "Relay:".bright_green(), self.peer.relay());
        Ok(())
    }

    async fn cmd_space(&mut self, args: &str) -> Result<()> {
        match parse_space_args(args)? {
            SpaceCommand::Switch(name) => {
                let status = self.peer.switch_space(name).await?;
                ui::print_status(&format!("Joining '{}'", name), status);
            }
            SpaceCommand::Create { name, description, text } => {
                let description = description.map(str::to_string);
                let status = self
                    .peer
                    .create_space(name, description, vec![ContentItem::text(text)])
                    .await?;
                ui::print_status(&format!("Space '{}'", name), status);
            }
        }
        Ok(())
    }

    async fn cmd_post(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            ui::print_error("Post cannot be empty");
            return Ok(());
        }

        let status = self.peer.post(vec![ContentItem::text(text)]).await?;
        ui::print_status("Post", status);
        Ok(())
    }

    async fn cmd_posts(&self) -> Result<()> {
        let posts = self.peer.recent_posts().await;

        println!();
        if posts.is_empty() {
            ui::print_info("No posts yet. Write one with: post <text>");
        } else {
            println!("{} ({}):", "Posts".bright_cyan().bold(), posts.len());
            for post in &posts {
                ui::print_post(post);
            }
        }
        println!();
        Ok(())
    }
}
