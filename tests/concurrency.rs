mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{author, make_context, post, Author, Post};
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use vellum::{
    transport::{MemoryStore, RemoteQuery, Transport},
    ClientOptions, CommitOptions, DataContext, Mutation, MutationResponse, TransportError,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_access_yields_one_set() {
    let (context, _store) = make_context();
    let context = Arc::new(context);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let context = context.clone();
        handles.push(tokio::spawn(async move { context.document_set::<Post>() }));
    }

    let first = context.document_set::<Post>();
    for handle in handles {
        let set = handle.await.unwrap();
        assert!(Arc::ptr_eq(&first, &set));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_recording_across_types_commits_everything() {
    let (context, store) = make_context();
    let context = Arc::new(context);

    let writer_a = {
        let context = context.clone();
        tokio::spawn(async move {
            let posts = context.document_set::<Post>();
            for i in 0..100 {
                posts
                    .create_or_replace(&post(Some(&format!("p{i}")), "post"))
                    .unwrap();
            }
        })
    };
    let writer_b = {
        let context = context.clone();
        tokio::spawn(async move {
            let authors = context.document_set::<Author>();
            for i in 0..100 {
                authors
                    .create_or_replace(&author(Some(&format!("a{i}")), "author"))
                    .unwrap();
            }
        })
    };
    writer_a.await.unwrap();
    writer_b.await.unwrap();

    assert_eq!(context.pending_changes(), 200);
    context.commit(CommitOptions::default()).await.unwrap();
    assert_eq!(context.pending_changes(), 0);
    assert_eq!(store.len(), 200);
}

/// Wraps a real store; signals when a transaction arrives, then blocks until
/// the test releases it. Lets tests inject work while a commit is in flight.
struct GatedTransport {
    inner: MemoryStore,
    entered: mpsc::UnboundedSender<()>,
    release: Semaphore,
}

#[async_trait]
impl Transport for GatedTransport {
    async fn execute_transaction(
        &self,
        mutations: &[Mutation],
        options: &CommitOptions,
    ) -> Result<MutationResponse, TransportError> {
        self.entered.send(()).expect("test listener alive");
        let _permit = self
            .release
            .acquire()
            .await
            .expect("release semaphore open");
        self.inner.execute_transaction(mutations, options).await
    }

    async fn execute_query(&self, query: &RemoteQuery) -> Result<Vec<Value>, TransportError> {
        self.inner.execute_query(query).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn append_during_in_flight_commit_stays_pending() {
    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(GatedTransport {
        inner: MemoryStore::new(),
        entered: entered_tx,
        release: Semaphore::new(0),
    });
    let context = Arc::new(DataContext::new(
        ClientOptions::new("https://store.example", "concurrency"),
        transport.clone(),
    ));

    let posts = context.document_set::<Post>();
    posts.create_or_replace(&post(Some("p1"), "one")).unwrap();
    posts.create_or_replace(&post(Some("p2"), "two")).unwrap();

    let committing = {
        let context = context.clone();
        tokio::spawn(async move { context.commit(CommitOptions::default()).await })
    };

    // Wait until the transaction is on the wire, then record one more intent.
    entered_rx.recv().await.unwrap();
    posts.create_or_replace(&post(Some("p3"), "three")).unwrap();
    transport.release.add_permits(1);

    committing.await.unwrap().unwrap();

    // The racing append survives the successful clear and goes out next.
    assert_eq!(posts.pending(), 1);
    assert_eq!(transport.inner.len(), 2);

    transport.release.add_permits(1);
    let second = {
        let context = context.clone();
        tokio::spawn(async move { context.commit(CommitOptions::default()).await })
    };
    entered_rx.recv().await.unwrap();
    second.await.unwrap().unwrap();
    assert_eq!(posts.pending(), 0);
    assert_eq!(transport.inner.len(), 3);
}
