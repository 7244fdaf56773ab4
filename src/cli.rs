use clap::{Parser, Subcommand};

/// Command-line options for Postbox.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a user (idempotent on name) and print their id.
    AddUser { name: String },

    /// List registered users.
    ListUsers,

    /// Create an unsent message from a sender to to/cc/bcc user ids.
    Compose {
        /// Sender user id.
        #[arg(long)]
        sender: i64,
        /// Primary recipient user ids (repeatable).
        #[arg(long)]
        to: Vec<i64>,
        /// Carbon-copy user ids (repeatable).
        #[arg(long)]
        cc: Vec<i64>,
        /// Blind-carbon-copy user ids (repeatable).
        #[arg(long)]
        bcc: Vec<i64>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },

    /// Move an unsent message into the outbound queue.
    Queue { id: i64 },

    /// Mark a message sent and its recipients unread.
    Deliver { id: i64 },

    /// Delete a message (hard for unsent, soft for sent with live copies).
    Delete { id: i64 },

    /// Hide a message from default listings.
    Hide { id: i64 },

    /// Clear a message's hidden flag.
    Unhide { id: i64 },

    /// Compose an unsent reply to a message.
    Reply {
        id: i64,
        /// Copy cc and bcc receivers as well.
        #[arg(long)]
        all: bool,
    },

    /// Compose an unsent forward of a message (no recipients, no thread).
    Forward { id: i64 },

    /// Print a message, its recipients and its reply thread.
    Show {
        id: i64,
        /// Emit the message as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// List messages, newest first.
    List {
        /// Include hidden messages.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        limit: Option<i64>,
    },
}
