use crate::errors::FieldError;
use crate::types::{
    Message, MessageState, PartyRef, Recipient, RecipientKind, RecipientState, now_ts,
};

impl Message {
    /// Blank unsent draft; invalid until a sender is set.
    pub fn draft() -> Self {
        let now = now_ts();
        Message {
            id: None,
            sender: None,
            subject: None,
            body: None,
            state: MessageState::Unsent,
            hidden_at: None,
            deleted_at: None,
            original_message_id: None,
            recipients: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new(sender: PartyRef) -> Self {
        let mut message = Self::draft();
        message.sender = Some(sender);
        message
    }

    pub fn add_to(&mut self, receiver: PartyRef) {
        self.push_recipient(RecipientKind::To, receiver);
    }

    pub fn add_cc(&mut self, receiver: PartyRef) {
        self.push_recipient(RecipientKind::Cc, receiver);
    }

    pub fn add_bcc(&mut self, receiver: PartyRef) {
        self.push_recipient(RecipientKind::Bcc, receiver);
    }

    fn push_recipient(&mut self, kind: RecipientKind, receiver: PartyRef) {
        let now = now_ts();
        let position = self.recipients.iter().filter(|r| r.kind == kind).count() as i64;
        self.recipients.push(Recipient {
            id: None,
            message_id: self.id,
            receiver,
            kind,
            state: RecipientState::Unsent,
            hidden_at: None,
            position,
            created_at: now,
            updated_at: now,
        });
    }

    pub fn to(&self) -> Vec<&Recipient> {
        self.of_kind(RecipientKind::To)
    }

    pub fn cc(&self) -> Vec<&Recipient> {
        self.of_kind(RecipientKind::Cc)
    }

    pub fn bcc(&self) -> Vec<&Recipient> {
        self.of_kind(RecipientKind::Bcc)
    }

    fn of_kind(&self, kind: RecipientKind) -> Vec<&Recipient> {
        self.recipients.iter().filter(|r| r.kind == kind).collect()
    }

    /// to ++ cc ++ bcc, insertion order preserved within each kind.
    pub fn all_recipients(&self) -> Vec<&Recipient> {
        let mut out = self.to();
        out.extend(self.cc());
        out.extend(self.bcc());
        out
    }

    pub fn to_receivers(&self) -> Vec<PartyRef> {
        self.to().iter().map(|r| r.receiver).collect()
    }

    pub fn cc_receivers(&self) -> Vec<PartyRef> {
        self.cc().iter().map(|r| r.receiver).collect()
    }

    pub fn bcc_receivers(&self) -> Vec<PartyRef> {
        self.bcc().iter().map(|r| r.receiver).collect()
    }

    // Not deduplicated.
    pub fn all_receivers(&self) -> Vec<PartyRef> {
        self.all_recipients().iter().map(|r| r.receiver).collect()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden_at.is_some()
    }

    /// Denied (false, no state change) unless unsent, not deleted, and
    /// addressed to at least one recipient of any kind.
    pub fn queue(&mut self) -> bool {
        if self.state != MessageState::Unsent || self.is_deleted() || self.recipients.is_empty() {
            return false;
        }
        let now = now_ts();
        self.state = MessageState::Queued;
        self.updated_at = now;
        for recipient in &mut self.recipients {
            // Recipients stay unsent until delivery.
            recipient.state = RecipientState::Unsent;
            recipient.updated_at = now;
        }
        true
    }

    /// Denied once sent, after deletion, or with zero recipients.
    pub fn deliver(&mut self) -> bool {
        if self.state == MessageState::Sent || self.is_deleted() || self.recipients.is_empty() {
            return false;
        }
        let now = now_ts();
        self.state = MessageState::Sent;
        self.updated_at = now;
        for recipient in &mut self.recipients {
            recipient.state = RecipientState::Unread;
            recipient.updated_at = now;
        }
        true
    }

    /// Flags the message deleted; hard vs soft removal is the store's call.
    pub fn delete(&mut self) -> bool {
        if self.is_deleted() {
            return false;
        }
        let now = now_ts();
        self.deleted_at = Some(now);
        self.updated_at = now;
        true
    }

    pub fn hide(&mut self) {
        let now = now_ts();
        self.hidden_at = Some(now);
        self.updated_at = now;
    }

    pub fn unhide(&mut self) {
        self.hidden_at = None;
        self.updated_at = now_ts();
    }

    /// Unsaved clone addressed to this message's `to` receivers, threaded
    /// onto it.
    pub fn reply(&self) -> Message {
        let mut reply = self.blank_clone();
        for receiver in self.to_receivers() {
            reply.add_to(receiver);
        }
        reply.original_message_id = self.id;
        reply
    }

    /// `reply`, plus the cc and bcc receiver lists verbatim.
    pub fn reply_to_all(&self) -> Message {
        let mut reply = self.reply();
        for receiver in self.cc_receivers() {
            reply.add_cc(receiver);
        }
        for receiver in self.bcc_receivers() {
            reply.add_bcc(receiver);
        }
        reply
    }

    /// Unsaved clone with no recipients and no thread link.
    pub fn forward(&self) -> Message {
        self.blank_clone()
    }

    fn blank_clone(&self) -> Message {
        let mut clone = Self::draft();
        clone.sender = self.sender;
        clone.subject = self.subject.clone();
        clone.body = self.body.clone();
        clone
    }

    /// Empty when the message can be saved.
    pub fn validation_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.sender.is_none() {
            errors.push(FieldError::new("sender", "is required"));
        }
        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validation_errors().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::types::{Message, MessageState, PartyRef, RecipientState};

    fn bob() -> PartyRef {
        PartyRef::user(1)
    }

    fn john() -> PartyRef {
        PartyRef::user(2)
    }

    fn mary() -> PartyRef {
        PartyRef::user(3)
    }

    fn message_to_john_cc_mary() -> Message {
        let mut m = Message::new(bob());
        m.subject = Some("lunch".into());
        m.body = Some("noon?".into());
        m.add_to(john());
        m.add_cc(mary());
        m
    }

    #[test]
    fn new_message_starts_unsent_and_empty() {
        let m = Message::new(bob());
        assert_eq!(m.state, MessageState::Unsent);
        assert!(m.all_recipients().is_empty());
        assert!(!m.is_deleted());
        assert!(!m.is_hidden());
    }

    #[test]
    fn recipients_partition_by_kind() {
        let mut m = Message::new(bob());
        m.add_bcc(mary());
        m.add_to(john());
        m.add_cc(mary());
        m.add_to(mary());

        assert_eq!(m.to_receivers(), vec![john(), mary()]);
        assert_eq!(m.cc_receivers(), vec![mary()]);
        assert_eq!(m.bcc_receivers(), vec![mary()]);
    }

    #[test]
    fn all_recipients_concatenates_to_cc_bcc_in_order() {
        let mut m = Message::new(bob());
        m.add_bcc(bob());
        m.add_cc(mary());
        m.add_to(john());

        let receivers = m.all_receivers();
        assert_eq!(receivers, vec![john(), mary(), bob()]);

        let kinds: Vec<_> = m.all_recipients().iter().map(|r| r.kind).collect();
        let mut sorted = kinds.clone();
        sorted.sort();
        assert_eq!(kinds, sorted);
    }

    #[test]
    fn all_receivers_keeps_duplicates() {
        let mut m = Message::new(bob());
        m.add_to(john());
        m.add_cc(john());
        assert_eq!(m.all_receivers(), vec![john(), john()]);
    }

    #[test]
    fn queue_moves_unsent_to_queued_and_leaves_recipients_unsent() {
        let mut m = message_to_john_cc_mary();
        assert!(m.queue());
        assert_eq!(m.state, MessageState::Queued);
        for recipient in m.all_recipients() {
            assert_eq!(recipient.state, RecipientState::Unsent);
        }
    }

    #[test]
    fn queue_denied_without_recipients() {
        let mut m = Message::new(bob());
        assert!(!m.queue());
        assert_eq!(m.state, MessageState::Unsent);
    }

    #[test]
    fn queue_denied_once_sent_or_queued() {
        let mut m = message_to_john_cc_mary();
        assert!(m.queue());
        assert!(!m.queue());

        let mut m = message_to_john_cc_mary();
        assert!(m.deliver());
        assert!(!m.queue());
        assert_eq!(m.state, MessageState::Sent);
    }

    #[test]
    fn queue_denied_after_delete() {
        let mut m = message_to_john_cc_mary();
        assert!(m.delete());
        assert!(!m.queue());
        assert_eq!(m.state, MessageState::Unsent);
    }

    #[test]
    fn deliver_marks_sent_and_recipients_unread() {
        let mut m = message_to_john_cc_mary();
        assert!(m.deliver());
        assert_eq!(m.state, MessageState::Sent);
        for recipient in m.all_recipients() {
            assert_eq!(recipient.state, RecipientState::Unread);
        }
    }

    #[test]
    fn deliver_allowed_from_queued() {
        let mut m = message_to_john_cc_mary();
        assert!(m.queue());
        assert!(m.deliver());
        assert_eq!(m.state, MessageState::Sent);
    }

    #[test]
    fn deliver_denied_without_recipients_or_once_sent_or_deleted() {
        let mut empty = Message::new(bob());
        assert!(!empty.deliver());
        assert_eq!(empty.state, MessageState::Unsent);

        let mut sent = message_to_john_cc_mary();
        assert!(sent.deliver());
        assert!(!sent.deliver());

        let mut deleted = message_to_john_cc_mary();
        assert!(deleted.delete());
        assert!(!deleted.deliver());
    }

    #[test]
    fn delete_twice_returns_false() {
        let mut m = message_to_john_cc_mary();
        assert!(m.delete());
        assert!(m.is_deleted());
        assert!(!m.delete());
    }

    #[test]
    fn hide_and_unhide_toggle_hidden_at() {
        let mut m = message_to_john_cc_mary();
        m.hide();
        assert!(m.is_hidden());
        m.unhide();
        assert!(!m.is_hidden());
    }

    #[test]
    fn reply_copies_to_receivers_only() {
        let mut m = message_to_john_cc_mary();
        m.id = Some(42);
        let reply = m.reply();

        assert_eq!(reply.subject, m.subject);
        assert_eq!(reply.body, m.body);
        assert_eq!(reply.sender, m.sender);
        assert_eq!(reply.to_receivers(), m.to_receivers());
        assert!(reply.cc().is_empty());
        assert!(reply.bcc().is_empty());
        assert_eq!(reply.state, MessageState::Unsent);
        assert_eq!(reply.original_message_id, Some(42));
        assert!(reply.id.is_none());
    }

    #[test]
    fn reply_to_all_copies_every_receiver_list() {
        let mut m = message_to_john_cc_mary();
        m.add_bcc(bob());
        let reply = m.reply_to_all();

        assert_eq!(reply.to_receivers(), m.to_receivers());
        assert_eq!(reply.cc_receivers(), m.cc_receivers());
        assert_eq!(reply.bcc_receivers(), m.bcc_receivers());
        assert_eq!(reply.state, MessageState::Unsent);
    }

    #[test]
    fn forward_drops_recipients_and_thread_link() {
        let mut m = message_to_john_cc_mary();
        m.id = Some(7);
        let forward = m.forward();

        assert_eq!(forward.subject, m.subject);
        assert_eq!(forward.body, m.body);
        assert!(forward.to().is_empty());
        assert!(forward.cc().is_empty());
        assert!(forward.bcc().is_empty());
        assert_eq!(forward.state, MessageState::Unsent);
        assert!(forward.original_message_id.is_none());
    }

    #[test]
    fn draft_without_sender_reports_field_error() {
        let m = Message::draft();
        assert!(!m.is_valid());
        let errors = m.validation_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "sender");

        let m = Message::new(bob());
        assert!(m.is_valid());
    }
}
