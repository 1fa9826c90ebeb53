use std::sync::Arc;

use ghostrecon_core::crypto::{
    GroupCrypto, GroupKey, IdentityCrypto, InMemoryKeyDirectory, KeyDirectory, MemoryKeyStore,
};
use ghostrecon_core::models::MessageBody;

struct Participant {
    identity: Arc<IdentityCrypto>,
    groups: GroupCrypto,
}

async fn join(
    store: &Arc<MemoryKeyStore>,
    directory: &InMemoryKeyDirectory,
    user_id: &str,
) -> Participant {
    let identity = Arc::new(IdentityCrypto::new(store.clone(), user_id));
    let view = directory.as_user(user_id);
    view.publish_public_key(&identity.public_key().await.unwrap())
        .await
        .unwrap();
    Participant {
        groups: GroupCrypto::new(identity.clone(), Arc::new(view)),
        identity,
    }
}

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn conversation_survives_one_unreachable_participant() {
    let store = Arc::new(MemoryKeyStore::new());
    let directory = InMemoryKeyDirectory::new();
    let alice = join(&store, &directory, "alice").await;
    let bob = join(&store, &directory, "bob").await;
    let carol = join(&store, &directory, "carol").await;
    directory.mark_unreachable("carol");

    let key = GroupCrypto::generate_group_key().unwrap();
    let report = alice
        .groups
        .distribute_group_key("conv-1", &ids(&["alice", "bob", "carol"]), &key)
        .await
        .unwrap();

    assert!(report.delivered.contains("alice"));
    assert!(report.delivered.contains("bob"));
    assert!(report.failed.contains("carol"));
    assert_eq!(directory.recipients("conv-1"), ids(&["alice", "bob"]));

    let token = alice
        .groups
        .encrypt_group_message("meet at noon", &key)
        .unwrap();

    assert_eq!(
        bob.groups.open_group_message("conv-1", &token).await,
        MessageBody::Text("meet at noon".to_string())
    );
    assert_eq!(
        carol.groups.open_group_message("conv-1", &token).await,
        MessageBody::KeyPending
    );
    assert!(carol.groups.get_my_group_key("conv-1").await.unwrap().is_none());
}

#[tokio::test]
async fn rotation_cuts_off_removed_participant() {
    let store = Arc::new(MemoryKeyStore::new());
    let directory = InMemoryKeyDirectory::new();
    let alice = join(&store, &directory, "alice").await;
    let bob = join(&store, &directory, "bob").await;
    let carol = join(&store, &directory, "carol").await;

    let first = GroupKey::generate().unwrap();
    alice
        .groups
        .distribute_group_key("conv-1", &ids(&["alice", "bob", "carol"]), &first)
        .await
        .unwrap();
    let carol_first = carol.groups.get_my_group_key("conv-1").await.unwrap().unwrap();

    let (second, report) = alice
        .groups
        .rotate_group_key("conv-1", &ids(&["alice", "bob"]))
        .await
        .unwrap();
    assert!(report.is_complete());

    let token = alice.groups.encrypt_group_message("carol left", &second).unwrap();
    assert_eq!(
        bob.groups.open_group_message("conv-1", &token).await,
        MessageBody::Text("carol left".to_string())
    );
    assert!(carol.groups.decrypt_group_message(&token, &carol_first).is_err());
    assert!(carol.groups.get_my_group_key("conv-1").await.unwrap().is_none());
}

#[tokio::test]
async fn identities_share_one_store_by_scope() {
    let store = Arc::new(MemoryKeyStore::new());
    let directory = InMemoryKeyDirectory::new();
    let alice = join(&store, &directory, "alice").await;
    let bob = join(&store, &directory, "bob").await;

    let bob_public = directory.public_key("bob").await.unwrap();
    let payload = alice.identity.encrypt("direct", &bob_public).await.unwrap();
    assert_eq!(bob.identity.decrypt(&payload).await.unwrap(), "direct");
    assert_ne!(
        alice.identity.public_key().await.unwrap(),
        bob.identity.public_key().await.unwrap()
    );
}
