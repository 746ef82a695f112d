//! UI utilities for pretty printing

use colored::Colorize;
use subchat_core::peer::{FailureReason, RequestStatus};
use subchat_core::types::{ContentItem, Post};
use subchat_core::wire::{ErrorReason, SpaceErrorReason};

pub fn print_help() {
    println!();
    println!("{}", "Available Commands:".bright_cyan().bold());
    println!();
    println!("  {:<42} {}", "help".bright_green(), "Show this help message");
    println!("  {:<42} {}", "quit, exit".bright_green(), "Exit the application");
    println!();
    println!("  {}", "Spaces:".bright_yellow().bold());
    println!("  {:<42} {}", "space <name>".bright_green(), "Switch to a space");
    println!(
        "  {:<42} {}",
        "space create <name> [description] -- <text>".bright_green(),
        "Create a space with its first post"
    );
    println!();
    println!("  {}", "Posts:".bright_yellow().bold());
    println!("  {:<42} {}", "posts".bright_green(), "Show recent posts in the current space");
    println!("  {:<42} {}", "post <text>".bright_green(), "Post to the current space");
    println!();
    println!("  {}", "Info:".bright_yellow().bold());
    println!("  {:<42} {}", "whoami".bright_green(), "Show your name and key");
    println!("  {:<42} {}", "relay".bright_green(), "Show the connected relay");
    println!("  {:<42} {}", "version".bright_green(), "Show version and build info");
    println!();
}

pub fn print_error(msg: &str) {
    println!("{} {}", "✗".bright_red(), msg.red());
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".bright_green(), msg.bright_green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".bright_blue(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".bright_yellow(), msg.yellow());
}

/// Report the outcome of a tracked request
pub fn print_status(action: &str, status: RequestStatus) {
    match status {
        RequestStatus::Completed => print_success(&format!("{} confirmed by relay", action)),
        RequestStatus::Failed(reason) => {
            print_error(&format!("{} rejected: {}", action, describe(reason)))
        }
        RequestStatus::NotFound | RequestStatus::Pending => {
            print_warning(&format!("{} not confirmed in time; it may still be applied", action))
        }
    }
}

fn describe(reason: FailureReason) -> &'static str {
    match reason {
        FailureReason::Relay(ErrorReason::NonExistentSpace) => "space does not exist",
        FailureReason::Relay(ErrorReason::StoreUnavailable) => "relay storage unavailable",
        FailureReason::Relay(ErrorReason::InvalidPost) => "post is missing an author or space",
        FailureReason::Space(SpaceErrorReason::TooManySimilar) => {
            "too many spaces with similar names"
        }
        FailureReason::Space(SpaceErrorReason::NameTaken) => "name already taken",
        FailureReason::Space(SpaceErrorReason::InvalidName) => "invalid space name",
    }
}

pub fn print_post(post: &Post) {
    let time = chrono::DateTime::from_timestamp_millis(post.created_at as i64)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "?".to_string());

    println!();
    println!("  {} {} {}", "│".bright_black(), post.author.bright_yellow(), time.bright_black());
    for item in &post.content {
        match item {
            ContentItem::Text { text, .. } => println!("  {} {}", "│".bright_black(), text),
            ContentItem::Media { media_kind, url, title, .. } => println!(
                "  {} [{:?}] {} {}",
                "│".bright_black(),
                media_kind,
                title.as_deref().unwrap_or(""),
                url.bright_blue()
            ),
        }
    }
}
