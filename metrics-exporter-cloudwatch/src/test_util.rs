use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use tokio::{sync::Semaphore, time::Instant};

use crate::{
    client::{MetricsClient, PutError, PutFuture},
    datum::Datum,
};

/// A single call observed by [`ScriptedClient`].
#[derive(Clone, Debug)]
pub struct RecordedPut {
    pub at: Instant,
    pub namespace: String,
    pub datums: Vec<Datum>,
}

/// A client that replays scripted responses, and succeeds once the script runs out.
///
/// When gated, every call first waits for a permit from the gate, which lets tests hold puts in flight.
#[derive(Clone, Default)]
pub struct ScriptedClient {
    responses: Arc<Mutex<VecDeque<Result<(), PutError>>>>,
    calls: Arc<Mutex<Vec<RecordedPut>>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedClient {
    pub fn new<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Result<(), PutError>>,
    {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().collect())),
            calls: Arc::default(),
            gate: None,
        }
    }

    /// Creates a client whose calls block until the returned semaphore hands out permits.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let client = Self { gate: Some(Arc::clone(&gate)), ..Self::default() };
        (client, gate)
    }

    pub fn calls(&self) -> Vec<RecordedPut> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|call| call.at).collect()
    }
}

impl MetricsClient for ScriptedClient {
    fn put_batch<'a>(&'a self, namespace: &'a str, datums: &'a [Datum]) -> PutFuture<'a> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(RecordedPut {
                at: Instant::now(),
                namespace: namespace.to_owned(),
                datums: datums.to_vec(),
            });

            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }

            self.responses.lock().unwrap().pop_front().unwrap_or(Ok(()))
        })
    }
}
