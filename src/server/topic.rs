// Copyright 2022. The Tari Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! The broker's topic and subscriber bookkeeping.
//!
//! Topics and subscribers form a bidirectional graph: a subscriber is in a topic's subscriber
//! set exactly when the topic's key is in the subscriber's topic set. Both tables live behind
//! one mutex and are only ever mutated together, which keeps that invariant local to this
//! module. A publish snapshots the target connections under the lock and fans out after
//! releasing it; a send failure to one subscriber does not abort delivery to the rest.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use log::*;

use crate::{
    message::{Message, MessageVariant, RetCode, TopicOpType, TopicRequest, TopicResponse},
    net::{Connection, ConnectionId},
};

const LOG_TARGET: &str = "jsonrpc::server::topic";

struct Topic {
    name: String,
    subscribers: HashSet<ConnectionId>,
}

impl Topic {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashSet::new(),
        }
    }
}

struct Subscriber {
    conn: Arc<Connection>,
    topics: HashSet<String>,
}

#[derive(Default)]
struct TopicTables {
    topics: HashMap<String, Topic>,
    subscribers: HashMap<ConnectionId, Subscriber>,
}

/// Hosts named topics, their subscription graph and the publish fan-out.
#[derive(Default)]
pub struct TopicManager {
    tables: Mutex<TopicTables>,
}

impl TopicManager {
    pub fn new() -> Self {
        Default::default()
    }

    /// Handles one topic request and replies to its sender. Registered on the dispatcher.
    pub fn handle_request(&self, conn: &Arc<Connection>, rid: String, req: TopicRequest) {
        debug!(target: LOG_TARGET, "topic request {:?} for '{}' on {}", req.op, req.key, conn.id());

        let rcode = match req.op {
            TopicOpType::Create => self.create(&req.key),
            TopicOpType::Remove => self.remove(&req.key),
            TopicOpType::Subscribe => self.subscribe(conn, &req.key),
            TopicOpType::Cancel => self.cancel(conn.id(), &req.key),
            TopicOpType::Publish => self.publish(&rid, &req),
        };

        if let Err(err) = conn.send(TopicResponse::new(rcode).into_message(rid)) {
            warn!(target: LOG_TARGET, "failed to send topic response on {}: {}", conn.id(), err);
        }
    }

    /// Cleans up after a closed connection. Connections that never subscribed need no cleanup.
    pub fn handle_connection_closed(&self, conn: &Arc<Connection>) {
        let mut tables = self.tables.lock().expect("topic manager lock poisoned");
        let subscriber = match tables.subscribers.remove(&conn.id()) {
            Some(subscriber) => subscriber,
            None => return,
        };
        for key in subscriber.topics {
            if let Some(topic) = tables.topics.get_mut(&key) {
                topic.subscribers.remove(&conn.id());
            }
        }
        debug!(target: LOG_TARGET, "dropped subscriber {}", conn.id());
    }

    /// Creating an existing topic is a no-op.
    fn create(&self, key: &str) -> RetCode {
        let mut tables = self.tables.lock().expect("topic manager lock poisoned");
        tables.topics.entry(key.to_string()).or_insert_with(|| Topic::new(key));
        RetCode::Ok
    }

    /// Removing a topic unlinks every subscriber from it.
    fn remove(&self, key: &str) -> RetCode {
        let mut tables = self.tables.lock().expect("topic manager lock poisoned");
        let topic = match tables.topics.remove(key) {
            Some(topic) => topic,
            None => return RetCode::NotFoundTopic,
        };
        for conn_id in topic.subscribers {
            if let Some(subscriber) = tables.subscribers.get_mut(&conn_id) {
                subscriber.topics.remove(key);
            }
        }
        info!(target: LOG_TARGET, "removed topic '{}'", topic.name);
        RetCode::Ok
    }

    fn subscribe(&self, conn: &Arc<Connection>, key: &str) -> RetCode {
        let mut tables = self.tables.lock().expect("topic manager lock poisoned");
        let tables = &mut *tables;
        let topic = match tables.topics.get_mut(key) {
            Some(topic) => topic,
            None => return RetCode::NotFoundTopic,
        };
        let subscriber = tables.subscribers.entry(conn.id()).or_insert_with(|| Subscriber {
            conn: conn.clone(),
            topics: HashSet::new(),
        });
        topic.subscribers.insert(conn.id());
        subscriber.topics.insert(key.to_string());
        RetCode::Ok
    }

    /// Cancelling an unknown topic or a subscription that does not exist is a no-op.
    fn cancel(&self, conn_id: ConnectionId, key: &str) -> RetCode {
        let mut tables = self.tables.lock().expect("topic manager lock poisoned");
        let tables = &mut *tables;
        if let (Some(topic), Some(subscriber)) = (tables.topics.get_mut(key), tables.subscribers.get_mut(&conn_id)) {
            topic.subscribers.remove(&conn_id);
            subscriber.topics.remove(key);
        }
        RetCode::Ok
    }

    /// Forwards the publish request unchanged, same rid included, to every subscriber of the
    /// topic. Subscribers tell it apart from a response by its message type.
    fn publish(&self, rid: &str, req: &TopicRequest) -> RetCode {
        let targets = {
            let tables = self.tables.lock().expect("topic manager lock poisoned");
            let topic = match tables.topics.get(&req.key) {
                Some(topic) => topic,
                None => return RetCode::NotFoundTopic,
            };
            topic
                .subscribers
                .iter()
                .filter_map(|id| tables.subscribers.get(id))
                .map(|subscriber| subscriber.conn.clone())
                .collect::<Vec<_>>()
        };

        debug!(target: LOG_TARGET, "publishing on '{}' to {} subscriber(s)", req.key, targets.len());
        for conn in targets {
            if let Err(err) = conn.send(Message::new(rid.to_string(), req.clone())) {
                warn!(target: LOG_TARGET, "failed to forward publish to {}: {}", conn.id(), err);
            }
        }
        RetCode::Ok
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::net::test_support::unattached_connection;

    fn expect_rcode(outbound: &mut tokio::sync::mpsc::UnboundedReceiver<Message>) -> RetCode {
        let (_, rsp) = TopicResponse::from_message(outbound.try_recv().unwrap()).unwrap();
        rsp.rcode
    }

    fn request(manager: &TopicManager, conn: &Arc<Connection>, req: TopicRequest) {
        manager.handle_request(conn, "rid".to_string(), req);
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let manager = TopicManager::new();
        let (conn, mut rx) = unattached_connection();
        request(&manager, &conn, TopicRequest::new("hello", TopicOpType::Create));
        assert_eq!(expect_rcode(&mut rx), RetCode::Ok);
        request(&manager, &conn, TopicRequest::new("hello", TopicOpType::Create));
        assert_eq!(expect_rcode(&mut rx), RetCode::Ok);
    }

    #[tokio::test]
    async fn publish_fans_out_to_every_subscriber() {
        let manager = TopicManager::new();
        let (publisher, mut publisher_rx) = unattached_connection();
        let (sub1, mut sub1_rx) = unattached_connection();
        let (sub2, mut sub2_rx) = unattached_connection();

        request(&manager, &publisher, TopicRequest::new("hello", TopicOpType::Create));
        assert_eq!(expect_rcode(&mut publisher_rx), RetCode::Ok);
        for (sub, rx) in vec![(&sub1, &mut sub1_rx), (&sub2, &mut sub2_rx)] {
            request(&manager, sub, TopicRequest::new("hello", TopicOpType::Subscribe));
            assert_eq!(expect_rcode(rx), RetCode::Ok);
        }

        manager.handle_request(&publisher, "pub-rid".to_string(), TopicRequest::publish("hello", "hello0"));
        assert_eq!(expect_rcode(&mut publisher_rx), RetCode::Ok);

        // Each subscriber receives the forwarded request with the publisher's rid.
        for rx in vec![&mut sub1_rx, &mut sub2_rx] {
            let forwarded = rx.try_recv().unwrap();
            assert_eq!(forwarded.rid(), "pub-rid");
            let (_, req) = TopicRequest::from_message(forwarded).unwrap();
            assert_eq!(req.msg, Some("hello0".to_string()));
        }

        // The publisher is not subscribed and receives no echo.
        assert!(publisher_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_to_missing_topic_is_not_found() {
        let manager = TopicManager::new();
        let (conn, mut rx) = unattached_connection();
        request(&manager, &conn, TopicRequest::publish("nope", "msg"));
        assert_eq!(expect_rcode(&mut rx), RetCode::NotFoundTopic);
    }

    #[tokio::test]
    async fn remove_unlinks_subscribers() {
        let manager = TopicManager::new();
        let (conn, mut rx) = unattached_connection();
        request(&manager, &conn, TopicRequest::new("hello", TopicOpType::Create));
        assert_eq!(expect_rcode(&mut rx), RetCode::Ok);
        request(&manager, &conn, TopicRequest::new("hello", TopicOpType::Subscribe));
        assert_eq!(expect_rcode(&mut rx), RetCode::Ok);

        request(&manager, &conn, TopicRequest::new("hello", TopicOpType::Remove));
        assert_eq!(expect_rcode(&mut rx), RetCode::Ok);
        request(&manager, &conn, TopicRequest::new("hello", TopicOpType::Remove));
        assert_eq!(expect_rcode(&mut rx), RetCode::NotFoundTopic);

        // Recreating and publishing reaches nobody: the old subscription is gone.
        request(&manager, &conn, TopicRequest::new("hello", TopicOpType::Create));
        assert_eq!(expect_rcode(&mut rx), RetCode::Ok);
        request(&manager, &conn, TopicRequest::publish("hello", "msg"));
        assert_eq!(expect_rcode(&mut rx), RetCode::Ok);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_stops_delivery_and_tolerates_unknowns() {
        let manager = TopicManager::new();
        let (publisher, mut publisher_rx) = unattached_connection();
        let (sub, mut sub_rx) = unattached_connection();

        // Cancelling before the topic or subscription exists is still OK.
        request(&manager, &sub, TopicRequest::new("hello", TopicOpType::Cancel));
        assert_eq!(expect_rcode(&mut sub_rx), RetCode::Ok);

        request(&manager, &publisher, TopicRequest::new("hello", TopicOpType::Create));
        assert_eq!(expect_rcode(&mut publisher_rx), RetCode::Ok);
        request(&manager, &sub, TopicRequest::new("hello", TopicOpType::Subscribe));
        assert_eq!(expect_rcode(&mut sub_rx), RetCode::Ok);
        request(&manager, &sub, TopicRequest::new("hello", TopicOpType::Cancel));
        assert_eq!(expect_rcode(&mut sub_rx), RetCode::Ok);

        request(&manager, &publisher, TopicRequest::publish("hello", "msg"));
        assert_eq!(expect_rcode(&mut publisher_rx), RetCode::Ok);
        assert!(sub_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_subscriber_is_unlinked() {
        let manager = TopicManager::new();
        let (publisher, mut publisher_rx) = unattached_connection();
        let (sub, mut sub_rx) = unattached_connection();

        request(&manager, &publisher, TopicRequest::new("hello", TopicOpType::Create));
        assert_eq!(expect_rcode(&mut publisher_rx), RetCode::Ok);
        request(&manager, &sub, TopicRequest::new("hello", TopicOpType::Subscribe));
        assert_eq!(expect_rcode(&mut sub_rx), RetCode::Ok);

        manager.handle_connection_closed(&sub);
        // A publisher-only connection closing is ignored.
        manager.handle_connection_closed(&publisher);

        request(&manager, &publisher, TopicRequest::publish("hello", "msg"));
        assert_eq!(expect_rcode(&mut publisher_rx), RetCode::Ok);
        assert!(sub_rx.try_recv().is_err());
    }
}
