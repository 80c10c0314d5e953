//! NATS JetStream adapter for the partitioned-log ports.
//!
//! The log maps onto one JetStream stream per topic with a durable pull
//! consumer per group: a message's stream sequence is the offset, an
//! explicit ack is the offset commit, and an unacked message is redelivered
//! to the group. JetStream has no partitions; the stream is partition 0.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_nats::jetstream::consumer::{pull, Consumer};
use async_nats::jetstream::stream::{Config as StreamConfig, StorageType};
use async_nats::jetstream::{self, Context};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::watch;

use facteur_ports::message_bus::{BusError, Header, Message, MessageReader, MessageWriter};

use super::config::BusConfig;

/// Header carrying the opaque message key across the wire.
const KEY_HEADER: &str = "facteur-key";

/// Messages requested per fetch round trip.
const FETCH_BATCH: usize = 16;

/// A connected log client; readers and writers are carved off it.
pub struct LogBus {
    client: async_nats::Client,
    jetstream: Context,
    config: BusConfig,
}

impl LogBus {
    /// Connect to the brokers and ensure the topic's stream exists.
    pub async fn connect(config: BusConfig) -> Result<Self, BusError> {
        let config = config.normalised();

        let mut options = async_nats::ConnectOptions::new();
        if config.tls.enabled {
            options = options.require_tls(true);
            if config.tls.insecure_skip_verify {
                tracing::warn!("broker certificate verification is not skippable; connecting with full verification");
            }
        }
        if config.sasl.enabled {
            if !config.sasl.mechanism.eq_ignore_ascii_case("plain") {
                return Err(BusError::Transport(format!(
                    "unsupported sasl mechanism {:?}",
                    config.sasl.mechanism
                )));
            }
            if config.sasl.username.is_empty() || config.sasl.password.is_empty() {
                return Err(BusError::Transport(
                    "sasl username and password are required for plain mechanism".to_string(),
                ));
            }
            options = options
                .user_and_password(config.sasl.username.clone(), config.sasl.password.clone());
        }

        let servers = config.brokers.join(",");
        let client = options
            .connect(servers)
            .await
            .map_err(|err| BusError::Transport(format!("connect brokers: {err}")))?;

        let jetstream = jetstream::new(client.clone());
        Self::ensure_stream(&jetstream, &config).await?;

        Ok(Self {
            client,
            jetstream,
            config,
        })
    }

    async fn ensure_stream(jetstream: &Context, config: &BusConfig) -> Result<(), BusError> {
        jetstream
            .get_or_create_stream(StreamConfig {
                name: config.stream_name(),
                // one subject per stream: the dead-letter topic gets its own
                subjects: vec![config.topic.clone()],
                storage: StorageType::File,
                ..StreamConfig::default()
            })
            .await
            .map_err(|err| BusError::Transport(format!("ensure stream: {err}")))?;
        Ok(())
    }

    /// Create the group's durable reader. The reader observes `shutdown`
    /// and yields the cancellation sentinel once it flips.
    pub async fn reader(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<JetStreamReader, BusError> {
        let consumer = self
            .jetstream
            .create_consumer_on_stream(
                pull::Config {
                    durable_name: Some(self.config.group_id.clone()),
                    filter_subject: self.config.topic.clone(),
                    ..pull::Config::default()
                },
                self.config.stream_name(),
            )
            .await
            .map_err(|err| BusError::Transport(format!("create durable consumer: {err}")))?;

        Ok(JetStreamReader {
            client: self.client.clone(),
            consumer,
            topic: self.config.topic.clone(),
            max_bytes: self.config.max_bytes,
            max_wait: self.config.max_wait,
            buffered: VecDeque::new(),
            pending: HashMap::new(),
            shutdown,
        })
    }

    /// Publisher for the given topic, sharing this connection. Used for the
    /// dead-letter log.
    pub async fn writer(&self, topic: &str) -> Result<JetStreamWriter, BusError> {
        let dlq_config = BusConfig {
            topic: topic.to_string(),
            ..self.config.clone()
        };
        Self::ensure_stream(&self.jetstream, &dlq_config).await?;

        Ok(JetStreamWriter {
            jetstream: self.jetstream.clone(),
            topic: topic.to_string(),
        })
    }
}

/// Durable pull reader owned by exactly one consumer.
pub struct JetStreamReader {
    client: async_nats::Client,
    consumer: Consumer<pull::Config>,
    topic: String,
    max_bytes: usize,
    max_wait: Duration,
    buffered: VecDeque<jetstream::Message>,
    pending: HashMap<u64, jetstream::Message>,
    shutdown: watch::Receiver<bool>,
}

impl JetStreamReader {
    fn convert(&self, raw: &jetstream::Message) -> Result<Message, BusError> {
        let info = raw
            .info()
            .map_err(|err| BusError::Transport(format!("message info: {err}")))?;

        let mut key = Vec::new();
        let mut headers = Vec::new();
        if let Some(map) = &raw.message.headers {
            for (name, values) in map.iter() {
                let name = name.to_string();
                for value in values.iter() {
                    if name == KEY_HEADER {
                        key = value.as_str().as_bytes().to_vec();
                    } else {
                        headers.push(Header {
                            key: name.clone(),
                            value: value.as_str().as_bytes().to_vec(),
                        });
                    }
                }
            }
        }

        Ok(Message {
            topic: self.topic.clone(),
            partition: 0,
            offset: info.stream_sequence,
            key,
            value: raw.message.payload.to_vec(),
            headers,
        })
    }
}

#[async_trait]
impl MessageReader for JetStreamReader {
    async fn fetch(&mut self) -> Result<Message, BusError> {
        loop {
            if *self.shutdown.borrow() {
                return Err(BusError::Cancelled);
            }

            if let Some(raw) = self.buffered.pop_front() {
                let message = self.convert(&raw)?;
                self.pending.insert(message.offset, raw);
                return Ok(message);
            }

            let consumer = self.consumer.clone();
            let max_bytes = self.max_bytes;
            let max_wait = self.max_wait;
            let fetch = async move {
                let mut stream = consumer
                    .fetch()
                    .max_messages(FETCH_BATCH)
                    .max_bytes(max_bytes)
                    .expires(max_wait)
                    .messages()
                    .await
                    .map_err(|err| BusError::Transport(format!("fetch batch: {err}")))?;

                let mut batch = Vec::new();
                while let Some(item) = stream.next().await {
                    batch
                        .push(item.map_err(|err| {
                            BusError::Transport(format!("fetch message: {err}"))
                        })?);
                }
                Ok::<_, BusError>(batch)
            };

            tokio::select! {
                changed = self.shutdown.changed() => {
                    // A dropped sender also means the host is going away.
                    if changed.is_err() || *self.shutdown.borrow() {
                        return Err(BusError::Cancelled);
                    }
                }
                batch = fetch => {
                    self.buffered.extend(batch?);
                }
            }
        }
    }

    async fn commit(&mut self, message: &Message) -> Result<(), BusError> {
        let raw = self.pending.remove(&message.offset).ok_or_else(|| {
            BusError::Transport(format!("offset {} is not pending", message.offset))
        })?;

        raw.ack()
            .await
            .map_err(|err| BusError::Transport(format!("ack offset {}: {err}", message.offset)))
    }

    async fn close(&mut self) -> Result<(), BusError> {
        self.buffered.clear();
        self.pending.clear();
        self.client
            .flush()
            .await
            .map_err(|err| BusError::Transport(format!("flush connection: {err}")))
    }
}

/// Publisher for one topic.
#[derive(Clone)]
pub struct JetStreamWriter {
    jetstream: Context,
    topic: String,
}

#[async_trait]
impl MessageWriter for JetStreamWriter {
    async fn write(&self, message: Message) -> Result<(), BusError> {
        let mut headers = async_nats::HeaderMap::new();
        for header in &message.headers {
            let value = String::from_utf8_lossy(&header.value).into_owned();
            headers.append(header.key.as_str(), value.as_str());
        }
        if !message.key.is_empty() {
            let key = String::from_utf8_lossy(&message.key).into_owned();
            headers.append(KEY_HEADER, key.as_str());
        }

        self.jetstream
            .publish_with_headers(self.topic.clone(), headers, message.value.into())
            .await
            .map_err(|err| BusError::Transport(format!("publish: {err}")))?
            .await
            .map_err(|err| BusError::Transport(format!("publish ack: {err}")))?;

        Ok(())
    }
}
