use postbox::storage::Database;
use postbox::types::{Message, MessageState, PartyRef};
use tempfile::TempDir;

async fn open_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Database::open(&dir.path().join("postbox.db"))
        .await
        .expect("open db");
    (dir, db)
}

/// bob -> to: john, cc: mary, bcc: sue, delivered.
async fn sent_message(db: &Database) -> Message {
    let bob = db.save_user("bob").await.expect("bob");
    let john = db.save_user("john").await.expect("john");
    let mary = db.save_user("mary").await.expect("mary");
    let sue = db.save_user("sue").await.expect("sue");

    let mut message = Message::new(bob.party());
    message.subject = Some("plans".into());
    message.body = Some("friday?".into());
    message.add_to(john.party());
    message.add_cc(mary.party());
    message.add_bcc(sue.party());
    assert!(db.save_message(&mut message).await.expect("save"));

    let id = message.id.expect("id");
    assert!(db.deliver_message(id).await.expect("deliver"));
    db.load_message(id).await.expect("load").expect("found")
}

#[tokio::test]
async fn reply_round_trips_with_to_receivers_only() {
    let (_dir, db) = open_db().await;
    let original = sent_message(&db).await;

    let mut reply = original.reply();
    assert!(db.save_message(&mut reply).await.expect("save reply"));

    let reloaded = db
        .load_message(reply.id.expect("id"))
        .await
        .expect("load")
        .expect("found");
    assert_eq!(reloaded.subject, original.subject);
    assert_eq!(reloaded.body, original.body);
    assert_eq!(reloaded.sender, original.sender);
    assert_eq!(reloaded.to_receivers(), original.to_receivers());
    assert!(reloaded.cc().is_empty());
    assert!(reloaded.bcc().is_empty());
    assert_eq!(reloaded.state, MessageState::Unsent);
    assert_eq!(reloaded.original_message_id, original.id);
}

#[tokio::test]
async fn reply_to_all_round_trips_every_receiver_list() {
    let (_dir, db) = open_db().await;
    let original = sent_message(&db).await;

    let mut reply = original.reply_to_all();
    assert!(db.save_message(&mut reply).await.expect("save reply"));

    let reloaded = db
        .load_message(reply.id.expect("id"))
        .await
        .expect("load")
        .expect("found");
    assert_eq!(reloaded.subject, original.subject);
    assert_eq!(reloaded.body, original.body);
    assert_eq!(reloaded.to_receivers(), original.to_receivers());
    assert_eq!(reloaded.cc_receivers(), original.cc_receivers());
    assert_eq!(reloaded.bcc_receivers(), original.bcc_receivers());
    assert_eq!(reloaded.state, MessageState::Unsent);
}

#[tokio::test]
async fn forward_round_trips_without_recipients_or_thread() {
    let (_dir, db) = open_db().await;
    let original = sent_message(&db).await;

    let mut forward = original.forward();
    assert!(db.save_message(&mut forward).await.expect("save forward"));
    let forward_id = forward.id.expect("id");

    let reloaded = db
        .load_message(forward_id)
        .await
        .expect("load")
        .expect("found");
    assert_eq!(reloaded.subject, original.subject);
    assert_eq!(reloaded.body, original.body);
    assert!(reloaded.all_recipients().is_empty());
    assert_eq!(reloaded.state, MessageState::Unsent);
    assert!(reloaded.original_message_id.is_none());
    assert!(db.thread(forward_id).await.expect("thread").is_empty());
}

#[tokio::test]
async fn thread_walks_ancestors_nearest_first() {
    let (_dir, db) = open_db().await;
    let original = sent_message(&db).await;
    let original_id = original.id.expect("id");

    let mut first_reply = original.reply();
    assert!(db.save_message(&mut first_reply).await.expect("save"));
    let first_id = first_reply.id.expect("id");

    let mut second_reply = first_reply.reply();
    assert!(db.save_message(&mut second_reply).await.expect("save"));
    let second_id = second_reply.id.expect("id");

    let ancestry: Vec<Option<i64>> = db
        .thread(second_id)
        .await
        .expect("thread")
        .iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ancestry, vec![Some(first_id), Some(original_id)]);

    assert!(db.thread(original_id).await.expect("thread").is_empty());
}

#[tokio::test]
async fn thread_terminates_on_a_reply_cycle() {
    let (_dir, db) = open_db().await;
    let mut original = sent_message(&db).await;
    let original_id = original.id.expect("id");

    let mut reply = original.reply();
    assert!(db.save_message(&mut reply).await.expect("save"));
    let reply_id = reply.id.expect("id");

    // Point the original back at its own reply; the walk must still
    // terminate and return each ancestor once.
    original.original_message_id = Some(reply_id);
    assert!(db.save_message(&mut original).await.expect("resave"));

    let ancestry: Vec<Option<i64>> = db
        .thread(reply_id)
        .await
        .expect("thread")
        .iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ancestry, vec![Some(original_id)]);

    let ancestry: Vec<Option<i64>> = db
        .thread(original_id)
        .await
        .expect("thread")
        .iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ancestry, vec![Some(reply_id)]);
}

#[tokio::test]
async fn reply_targets_are_fresh_pending_recipients() {
    let (_dir, db) = open_db().await;
    let original = sent_message(&db).await;

    // Delivered recipients are unread on the original; the reply starts over.
    let reply = original.reply();
    assert!(reply.id.is_none());
    for recipient in reply.all_recipients() {
        assert!(recipient.id.is_none());
        assert_eq!(
            recipient.state,
            postbox::types::RecipientState::Unsent
        );
    }

    // Receivers, not recipient rows, are what carries over.
    assert_eq!(
        reply.to_receivers(),
        original
            .to()
            .iter()
            .map(|r| r.receiver)
            .collect::<Vec<PartyRef>>()
    );
}
