use openview_core::RecordKind;
use openview_engine::{RecordDraft, SaveOptions};
use openview_harness::TestPeer;
use openview_storage::RecordStore;

fn share_draft(recipients: &str) -> RecordDraft {
    RecordDraft {
        recipients: Some(recipients.into()),
        ..Default::default()
    }
}

#[test]
fn unknown_email_provisions_account_and_notifies() -> Result<(), Box<dyn std::error::Error>> {
    let mut peer = TestPeer::new()?;
    let owner = peer.session_owner();
    let accounts_before = peer.account_count()?;

    let record = peer.engine.create(
        &owner,
        RecordKind::Query,
        share_draft("email1@email.com"),
        SaveOptions::default(),
    )?;
    assert_eq!(record.shared_with()?.len(), 1);

    // The account was provisioned inactive, with the email as username.
    assert_eq!(peer.account_count()?, accounts_before + 1);
    let account = peer
        .engine
        .store()
        .account_by_email("email1@email.com")?
        .expect("provisioned account");
    assert!(!account.active);
    assert_eq!(account.username, "email1@email.com");

    let mail = peer.sent_mail();
    assert_eq!(mail.len(), 1);
    assert_eq!(mail[0].to, ["email1@email.com"]);
    assert_eq!(mail[0].record_id, record.id.unwrap());
    Ok(())
}

#[test]
fn existing_account_gets_first_time_notification() -> Result<(), Box<dyn std::error::Error>> {
    let mut peer = TestPeer::new()?;
    peer.create_account("user_1")?;
    let owner = peer.session_owner();
    let accounts_before = peer.account_count()?;

    let record = peer.engine.create(
        &owner,
        RecordKind::Query,
        share_draft("user_1"),
        SaveOptions::default(),
    )?;
    assert_eq!(record.shared_with()?.len(), 1);
    assert_eq!(peer.account_count()?, accounts_before);

    let mail = peer.sent_mail();
    assert_eq!(mail.len(), 1);
    assert_eq!(mail[0].to, ["user_1@email.com"]);
    Ok(())
}

#[test]
fn mixed_recipient_list_grants_twice_invites_once() -> Result<(), Box<dyn std::error::Error>> {
    let mut peer = TestPeer::new()?;
    peer.create_account("user_1")?;
    let owner = peer.session_owner();
    let accounts_before = peer.account_count()?;

    let record = peer.engine.create(
        &owner,
        RecordKind::Query,
        share_draft("user_1, valid@email.com, invalid+=email@fake@domain@com, "),
        SaveOptions::default(),
    )?;

    // The malformed token is dropped silently; the unknown address was
    // provisioned; one invitation covers both first-time recipients.
    assert_eq!(record.shared_with()?.len(), 2);
    assert_eq!(peer.account_count()?, accounts_before + 1);

    let mail = peer.sent_mail();
    assert_eq!(mail.len(), 1);
    assert_eq!(mail[0].to, ["user_1@email.com", "valid@email.com"]);

    // Dropping a recipient on the next save revokes silently: no account is
    // deleted and no further mail goes out.
    let pk = record.id.unwrap();
    let accounts_before = peer.account_count()?;
    let updated = peer.engine.update(
        &owner,
        RecordKind::Query,
        pk,
        share_draft("user_1"),
        SaveOptions::default(),
    )?;

    assert_eq!(updated.shared_with()?.len(), 1);
    assert_eq!(peer.account_count()?, accounts_before);
    assert_eq!(peer.sent_mail().len(), 1);
    Ok(())
}

#[test]
fn already_shared_recipients_are_not_renotified() -> Result<(), Box<dyn std::error::Error>> {
    let mut peer = TestPeer::new()?;
    peer.create_account("user_1")?;
    let owner = peer.session_owner();

    let record = peer.engine.create(
        &owner,
        RecordKind::Query,
        share_draft("user_1"),
        SaveOptions::default(),
    )?;
    assert_eq!(peer.sent_mail().len(), 1);

    // user_1 is already in the shared set; only the newcomer is invited.
    let pk = record.id.unwrap();
    let updated = peer.engine.update(
        &owner,
        RecordKind::Query,
        pk,
        share_draft("user_1, new@email.com"),
        SaveOptions::default(),
    )?;
    assert_eq!(updated.shared_with()?.len(), 2);

    let mail = peer.sent_mail();
    assert_eq!(mail.len(), 2);
    assert_eq!(mail[1].to, ["new@email.com"]);
    Ok(())
}

#[test]
fn omitting_the_recipient_field_preserves_shares() -> Result<(), Box<dyn std::error::Error>> {
    let mut peer = TestPeer::new()?;
    peer.create_account("user_1")?;
    let owner = peer.session_owner();

    let record = peer.engine.create(
        &owner,
        RecordKind::Query,
        share_draft("user_1"),
        SaveOptions::default(),
    )?;
    let pk = record.id.unwrap();
    assert_eq!(peer.sent_mail().len(), 1);

    let renamed = peer.engine.update(
        &owner,
        RecordKind::Query,
        pk,
        RecordDraft {
            name: Some("renamed".into()),
            ..Default::default()
        },
        SaveOptions::default(),
    )?;

    assert_eq!(renamed.shared_with()?.len(), 1);
    assert_eq!(peer.sent_mail().len(), 1);
    Ok(())
}

#[test]
fn empty_recipient_list_revokes_everyone() -> Result<(), Box<dyn std::error::Error>> {
    let mut peer = TestPeer::new()?;
    peer.create_account("user_1")?;
    let owner = peer.session_owner();

    let record = peer.engine.create(
        &owner,
        RecordKind::Query,
        share_draft("user_1"),
        SaveOptions::default(),
    )?;
    let pk = record.id.unwrap();

    let updated = peer.engine.update(
        &owner,
        RecordKind::Query,
        pk,
        share_draft(""),
        SaveOptions::default(),
    )?;

    assert!(updated.shared_with()?.is_empty());
    assert_eq!(peer.sent_mail().len(), 1);
    Ok(())
}
