use crate::cli::{Cli, Command};
use crate::config::AppDefaults;
use crate::errors::StoreError;
use crate::storage::{Database, MessageFilter};
use crate::types::{Message, PartyRef};
use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

pub async fn run(cli: Cli) -> Result<()> {
    let defaults = AppDefaults::load()?;
    let db = Database::new_default().await?;
    info!(path = %db.path().display(), "Using SQLite store");

    match cli.command {
        Command::AddUser { name } => {
            let user = db.save_user(&name).await?;
            println!("{} -> user {}", user.name, user.id);
        }

        Command::ListUsers => {
            let users = db.list_users().await?;
            if users.is_empty() {
                println!("No users.");
            }
            for user in &users {
                println!("{}. {}", user.id, user.name);
            }
        }

        Command::Compose {
            sender,
            to,
            cc,
            bcc,
            subject,
            body,
        } => {
            let mut message = Message::new(PartyRef::user(sender));
            message.subject = subject;
            message.body = body;
            for id in to {
                message.add_to(PartyRef::user(id));
            }
            for id in cc {
                message.add_cc(PartyRef::user(id));
            }
            for id in bcc {
                message.add_bcc(PartyRef::user(id));
            }
            save_new(&db, &mut message).await?;
        }

        Command::Queue { id } => {
            report(db.queue_message(id).await?, id, "queued");
        }

        Command::Deliver { id } => {
            report(db.deliver_message(id).await?, id, "delivered");
        }

        Command::Delete { id } => {
            report(db.delete_message(id).await?, id, "deleted");
        }

        Command::Hide { id } => {
            report(db.hide_message(id).await?, id, "hidden");
        }

        Command::Unhide { id } => {
            report(db.unhide_message(id).await?, id, "visible again");
        }

        Command::Reply { id, all } => {
            let original = db
                .load_message(id)
                .await?
                .ok_or(StoreError::NotFound(id))?;
            let mut reply = if all {
                original.reply_to_all()
            } else {
                original.reply()
            };
            save_new(&db, &mut reply).await?;
        }

        Command::Forward { id } => {
            let original = db
                .load_message(id)
                .await?
                .ok_or(StoreError::NotFound(id))?;
            let mut forward = original.forward();
            save_new(&db, &mut forward).await?;
        }

        Command::Show { id, json } => {
            let message = db
                .load_message(id)
                .await?
                .ok_or(StoreError::NotFound(id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&message)?);
            } else {
                print_message(&message);
                let thread = db.thread(id).await?;
                if !thread.is_empty() {
                    println!("In reply to:");
                    for ancestor in &thread {
                        println!("  {}", summary_line(ancestor));
                    }
                }
            }
        }

        Command::List { all, limit } => {
            let filter = MessageFilter {
                visible_only: !(all || defaults.show_hidden),
                limit: Some(limit.unwrap_or(defaults.list_limit)),
                ..Default::default()
            };
            let messages = db.list_messages(&filter).await?;
            if messages.is_empty() {
                println!("No messages.");
            }
            for message in &messages {
                println!("{}", summary_line(message));
            }
        }
    }

    Ok(())
}

async fn save_new(db: &Database, message: &mut Message) -> Result<()> {
    if !db.save_message(message).await? {
        return Err(StoreError::Invalid(message.validation_errors()).into());
    }
    if let Some(id) = message.id {
        println!("message {}", id);
    }
    Ok(())
}

fn report(changed: bool, id: i64, verb: &str) {
    if changed {
        println!("message {} {}", id, verb);
    } else {
        println!("message {} unchanged", id);
    }
}

fn print_message(message: &Message) {
    println!("{}", summary_line(message));
    if let Some(body) = &message.body {
        for line in body.lines().take(5) {
            println!("  {}", line);
        }
    }
    for recipient in message.all_recipients() {
        println!(
            "  {}: user {} [{}]",
            recipient.kind.as_str(),
            recipient.receiver.id,
            recipient.state.as_str()
        );
    }
}

fn summary_line(message: &Message) -> String {
    let id = message.id.unwrap_or_default();
    let date = DateTime::<Utc>::from_timestamp(message.created_at, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let subject = message.subject.as_deref().unwrap_or("(no subject)");
    let mut flags = String::new();
    if message.is_hidden() {
        flags.push_str(" hidden");
    }
    if message.is_deleted() {
        flags.push_str(" deleted");
    }
    format!(
        "{}. [{}] [{}]{} {} ({} recipients)",
        id,
        date,
        message.state.as_str(),
        flags,
        subject,
        message.recipients.len()
    )
}
