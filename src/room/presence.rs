//! 세션/접속 관리
//!
//! 연결 ID 와 세션 ID 를 분리해서 새로고침 재접속을 같은 좌석으로 처리하고,
//! 관리자 선출과 승계를 담당한다.

use super::actor::RoomActor;
use super::timer::ScheduledTask;
use super::{is_valid_password, RoomCommand, User};
use crate::error::{JoinError, RoomError};
use crate::protocol::{ChatEntry, ChatKind, ServerMessage, UserInfo};
use std::time::Duration;
use tokio::time::Instant;

/// 음소거 최대 길이
const MAX_MUTE: Duration = Duration::from_secs(24 * 60 * 60);

/// 참여 성공 결과
#[derive(Debug)]
pub struct JoinOutcome {
    pub user: UserInfo,
    pub is_admin: bool,
    /// 기존 좌석을 되찾은 경우
    pub reconnected: bool,
    /// 저장된 관리자 세션이 관리자 권한을 되찾은 경우
    pub admin_restored: bool,
}

impl RoomActor {
    pub(crate) fn handle_join(
        &mut self,
        transport_id: &str,
        session_id: &str,
        name: Option<String>,
        password: Option<String>,
    ) {
        match self.join(transport_id, session_id, name, password) {
            Ok(outcome) => {
                self.room.deletion = None;
                let attached = self.peers.attach(transport_id, &self.room.id);

                tracing::info!(
                    room_id = %self.room.id,
                    peer_id = %transport_id,
                    session_id = %session_id,
                    is_admin = outcome.is_admin,
                    reconnected = outcome.reconnected,
                    "User joined room"
                );

                if outcome.reconnected {
                    self.emit_to_room(ServerMessage::UserUpdated {
                        user: outcome.user.clone(),
                    });
                } else {
                    self.emit_to_room(ServerMessage::UserJoined {
                        user: outcome.user.clone(),
                        count: self.room.users.len(),
                        admin: self.room.admin.clone(),
                    });
                }

                if outcome.admin_restored {
                    self.emit_to_room(ServerMessage::AdminChanged {
                        new_admin_id: outcome.user.id.clone(),
                        new_admin_name: outcome.user.name.clone(),
                    });
                }

                self.emit_state_to(transport_id);

                // 참여 처리 전에 연결이 끊겼으면 유예 제거로 넘긴다
                if !attached {
                    self.handle_disconnect(transport_id);
                }
            }
            Err(e) => {
                tracing::warn!(
                    room_id = %self.room.id,
                    peer_id = %transport_id,
                    session_id = %session_id,
                    error = %e,
                    "Join rejected"
                );

                let message = match e {
                    JoinError::PasswordRequired => ServerMessage::PasswordRequired {
                        room_id: self.room.id.clone(),
                    },
                    JoinError::InvalidPassword => ServerMessage::InvalidPassword {
                        room_id: self.room.id.clone(),
                        message: e.to_string(),
                    },
                    JoinError::DuplicateSession => ServerMessage::DuplicateSession,
                };
                self.emit_to(transport_id, message);

                if self.room.users.is_empty() && self.room.deletion.is_none() {
                    self.schedule_deletion();
                }
            }
        }
    }

    /// 방 참여. 실패 시 방 상태는 변하지 않는다.
    pub(crate) fn join(
        &mut self,
        transport_id: &str,
        session_id: &str,
        name: Option<String>,
        password: Option<String>,
    ) -> Result<JoinOutcome, JoinError> {
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let is_admin_session = self.room.admin_session.as_deref() == Some(session_id);

        // 같은 세션: 재접속 또는 중복 탭
        if let Some(index) = self.room.users.iter().position(|u| u.session_id == session_id) {
            let existing = &self.room.users[index];
            if existing.transport_id != transport_id
                && !existing.inactive
                && self.peers.is_connected(&existing.transport_id)
            {
                return Err(JoinError::DuplicateSession);
            }

            let user = &mut self.room.users[index];
            let previous = std::mem::replace(&mut user.transport_id, transport_id.to_string());
            user.inactive = false;
            user.removal = None;
            if let Some(name) = name {
                user.name = name;
            }
            let info = user.info();

            if previous != transport_id {
                self.peers.detach(&previous, &self.room.id);
            }

            let mut admin_restored = false;
            if is_admin_session && !self.room.is_admin(transport_id) {
                self.room.admin = Some(transport_id.to_string());
                admin_restored = true;
            }

            return Ok(JoinOutcome {
                user: info,
                is_admin: self.room.is_admin(transport_id),
                reconnected: true,
                admin_restored,
            });
        }

        // 같은 연결이 다른 세션 ID 로 다시 참여한 경우
        if let Some(index) = self.room.user_index(transport_id) {
            let user = &mut self.room.users[index];
            if let Some(name) = name {
                user.name = name;
            }
            return Ok(JoinOutcome {
                user: user.info(),
                is_admin: self.room.is_admin(transport_id),
                reconnected: true,
                admin_restored: false,
            });
        }

        let first_join = !self.room.initialized;

        if !first_join && !is_admin_session {
            if let Some(expected) = &self.room.password {
                match password.as_deref().filter(|p| !p.is_empty()) {
                    None => return Err(JoinError::PasswordRequired),
                    Some(given) if given != expected => return Err(JoinError::InvalidPassword),
                    Some(_) => {}
                }
            }
        }

        if first_join {
            self.room.initialized = true;
            self.room.password = password.filter(|p| is_valid_password(p));
        }

        let name = name.unwrap_or_else(|| {
            let short: String = transport_id.chars().take(4).collect();
            format!("User {short}")
        });
        let user = User {
            transport_id: transport_id.to_string(),
            session_id: session_id.to_string(),
            name,
            inactive: false,
            removal: None,
            muted_until: None,
        };
        let info = user.info();
        self.room.users.push(user);

        let mut admin_restored = false;
        if self.room.users.len() == 1 || is_admin_session {
            admin_restored = !first_join && is_admin_session;
            self.room.admin = Some(transport_id.to_string());
            self.room.admin_session = Some(session_id.to_string());
        }

        Ok(JoinOutcome {
            user: info,
            is_admin: self.room.is_admin(transport_id),
            reconnected: false,
            admin_restored,
        })
    }

    /// 연결 종료: 좌석을 비활성으로 표시하고 유예 후 제거를 예약한다
    pub(crate) fn handle_disconnect(&mut self, transport_id: &str) {
        let Some(index) = self.room.user_index(transport_id) else {
            return;
        };
        let task_id = self.next_task_id();
        let grace = self.config.grace_period;
        let tx = self.tx.clone();

        let user = &mut self.room.users[index];
        user.inactive = true;
        user.removal = Some(ScheduledTask::once(
            task_id,
            grace,
            tx,
            RoomCommand::RemovalDue {
                session_id: user.session_id.clone(),
                task_id,
            },
        ));

        tracing::info!(
            room_id = %self.room.id,
            peer_id = %transport_id,
            grace_ms = grace.as_millis() as u64,
            "User disconnected, waiting for reconnection"
        );
    }

    pub(crate) fn on_removal_due(&mut self, session_id: &str, task_id: u64) {
        let Some(index) = self
            .room
            .users
            .iter()
            .position(|u| u.session_id == session_id)
        else {
            return;
        };
        let user = &self.room.users[index];
        if !user.inactive || user.removal.as_ref().map(ScheduledTask::id) != Some(task_id) {
            tracing::debug!(room_id = %self.room.id, session_id = %session_id, "Stale removal ignored");
            return;
        }

        let user = self.room.users.remove(index);
        tracing::info!(room_id = %self.room.id, peer_id = %user.transport_id, name = %user.name, "User timed out, removed");

        if self.room.is_admin(&user.transport_id) {
            self.reassign_admin();
        }

        self.emit_to_room(ServerMessage::UserLeft {
            user_id: user.transport_id.clone(),
            count: self.room.users.len(),
            admin: self.room.admin.clone(),
            kicked: false,
        });
        self.emit_to_room(ServerMessage::system_chat(format!("{} left the room.", user.name)));

        if self.room.users.is_empty() {
            self.schedule_deletion();
        }
    }

    /// 활성 사용자 우선으로 관리자 승계. 아무도 없으면 관리자 세션만 남긴다.
    fn reassign_admin(&mut self) {
        let next = self
            .room
            .users
            .iter()
            .find(|u| !u.inactive)
            .or_else(|| self.room.users.first())
            .map(|u| (u.transport_id.clone(), u.session_id.clone(), u.name.clone()));

        let Some((transport_id, session_id, name)) = next else {
            self.room.admin = None;
            return;
        };

        self.room.admin = Some(transport_id.clone());
        self.room.admin_session = Some(session_id);

        tracing::info!(room_id = %self.room.id, new_admin = %transport_id, "Admin left, promoted next user");

        self.emit_to_room(ServerMessage::AdminChanged {
            new_admin_id: transport_id,
            new_admin_name: name.clone(),
        });
        self.emit_to_room(ServerMessage::system_chat(format!(
            "Admin left. {name} is now the admin."
        )));
    }

    pub(crate) fn schedule_deletion(&mut self) {
        let task_id = self.next_task_id();
        self.room.deletion = Some(ScheduledTask::once(
            task_id,
            self.config.empty_timeout,
            self.tx.clone(),
            RoomCommand::DeletionDue { task_id },
        ));
        tracing::info!(
            room_id = %self.room.id,
            timeout_secs = self.config.empty_timeout.as_secs(),
            "Room empty, deletion scheduled"
        );
    }

    pub(crate) fn grant_admin(&mut self, transport_id: &str, target: &str) {
        if !self.room.is_admin(transport_id) {
            tracing::debug!(room_id = %self.room.id, peer_id = %transport_id, "Non-admin grant_admin dropped");
            return;
        }
        let Some(index) = self.room.find_target(target) else {
            return;
        };
        let user = &self.room.users[index];
        if user.transport_id == transport_id {
            return;
        }
        let (new_admin, session, name) = (
            user.transport_id.clone(),
            user.session_id.clone(),
            user.name.clone(),
        );

        self.room.admin = Some(new_admin.clone());
        self.room.admin_session = Some(session);

        tracing::info!(room_id = %self.room.id, from = %transport_id, to = %new_admin, "Admin granted");

        self.emit_to_room(ServerMessage::AdminChanged {
            new_admin_id: new_admin,
            new_admin_name: name.clone(),
        });
        self.emit_to_room(ServerMessage::system_chat(format!("{name} is now the admin.")));
        self.emit_state_to_room();
    }

    pub(crate) fn kick_user(&mut self, transport_id: &str, target: &str) {
        if !self.room.is_admin(transport_id) {
            tracing::debug!(room_id = %self.room.id, peer_id = %transport_id, "Non-admin kick_user dropped");
            return;
        }
        let Some(index) = self.room.find_target(target) else {
            return;
        };
        if self.room.users[index].transport_id == transport_id {
            return;
        }

        let user = self.room.users.remove(index);
        tracing::info!(room_id = %self.room.id, peer_id = %user.transport_id, name = %user.name, "User kicked");

        self.emit_to(
            &user.transport_id,
            ServerMessage::Kicked {
                room_id: self.room.id.clone(),
                reason: "Removed by admin".to_string(),
            },
        );
        self.peers.detach(&user.transport_id, &self.room.id);

        self.emit_to_room(ServerMessage::system_chat(format!("{} kicked.", user.name)));
        self.emit_to_room(ServerMessage::UserLeft {
            user_id: user.transport_id,
            count: self.room.users.len(),
            admin: self.room.admin.clone(),
            kicked: true,
        });
    }

    pub(crate) fn update_name(&mut self, transport_id: &str, name: String) {
        let name = name.trim().to_string();
        if name.is_empty() {
            return;
        }
        let Some(index) = self.room.user_index(transport_id) else {
            return;
        };
        self.room.users[index].name = name;
        let user = self.room.users[index].info();

        self.emit_to_room(ServerMessage::UserUpdated { user });
        self.emit_state_to_room();
    }

    pub(crate) fn chat(&mut self, transport_id: &str, message: String, image: Option<String>) {
        let Some(user) = self.room.user(transport_id) else {
            return;
        };
        if user.is_muted(Instant::now()) {
            self.emit_to(transport_id, ServerMessage::error(&RoomError::Muted));
            return;
        }
        if message.trim().is_empty() && image.is_none() {
            return;
        }

        let entry = ChatEntry {
            kind: ChatKind::User,
            user_id: Some(transport_id.to_string()),
            name: Some(user.name.clone()),
            content: message,
            image,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        self.emit_to_room(ServerMessage::ChatMessage(entry));
    }

    /// `seconds == 0` 이면 음소거 해제
    pub(crate) fn mute_user(&mut self, transport_id: &str, target: &str, seconds: u64) {
        if !self.room.is_admin(transport_id) {
            return;
        }
        let Some(index) = self.room.find_target(target) else {
            return;
        };
        let user = &mut self.room.users[index];
        if user.transport_id == transport_id {
            return;
        }

        let length = Duration::from_secs(seconds).min(MAX_MUTE);
        let content = if seconds == 0 {
            user.muted_until = None;
            format!("{} was unmuted.", user.name)
        } else {
            user.muted_until = Some(Instant::now() + length);
            format!("{} was muted for {}s.", user.name, length.as_secs())
        };

        tracing::info!(room_id = %self.room.id, target = %user.transport_id, seconds = length.as_secs(), "User mute updated");
        self.emit_to_room(ServerMessage::system_chat(content));
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::ServerMessage;
    use crate::provider::MockVideoProvider;
    use crate::room::registry::test_support::{settle, Harness};
    use crate::room::RoomIntent;
    use std::time::Duration;

    fn count<F: Fn(&ServerMessage) -> bool>(messages: &[ServerMessage], f: F) -> usize {
        messages.iter().filter(|m| f(m)).count()
    }

    #[tokio::test(start_paused = true)]
    async fn first_joiner_becomes_admin_and_receives_state() {
        let harness = Harness::new(MockVideoProvider::new());
        let mut alice = harness.connect("alice-t1");

        harness.join("lobby", &alice, "s-alice", Some("Alice"), None);
        settle().await;

        let messages = alice.drain();
        assert!(matches!(
            &messages[0],
            ServerMessage::UserJoined { user, count: 1, admin: Some(admin) }
                if user.name == "Alice" && admin == "alice-t1"
        ));
        assert!(matches!(
            messages.last(),
            Some(ServerMessage::SyncState(s)) if s.admin.as_deref() == Some("alice-t1")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_name_gets_default() {
        let harness = Harness::new(MockVideoProvider::new());
        let alice = harness.connect("abcdef");

        harness.join("lobby", &alice, "s-alice", None, None);
        settle().await;

        let name = harness
            .inspect("lobby", |room| room.users[0].name.clone())
            .await
            .unwrap();
        assert_eq!(name, "User abcd");
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_within_grace_keeps_seat() {
        // given
        let harness = Harness::new(MockVideoProvider::new());
        let alice = harness.connect("alice-t1");
        let mut bob = harness.connect("bob-t1");
        harness.join("lobby", &alice, "s-alice", Some("Alice"), None);
        harness.join("lobby", &bob, "s-bob", Some("Bob"), None);
        settle().await;
        bob.drain();

        // when: 새로고침 후 1초 만에 재접속
        harness.disconnect("lobby", alice);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let alice = harness.connect("alice-t2");
        harness.join("lobby", &alice, "s-alice", Some("Alice"), None);
        tokio::time::sleep(Duration::from_secs(5)).await;

        // then
        let messages = bob.drain();
        assert_eq!(count(&messages, |m| matches!(m, ServerMessage::UserJoined { .. })), 0);
        assert_eq!(count(&messages, |m| matches!(m, ServerMessage::UserLeft { .. })), 0);
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::UserUpdated { user } if user.id == "alice-t2" && user.name == "Alice"
        )));

        let (users, admin) = harness
            .inspect("lobby", |room| (room.users.len(), room.admin.clone()))
            .await
            .unwrap();
        assert_eq!(users, 2);
        assert_eq!(admin.as_deref(), Some("alice-t2"));
    }

    #[tokio::test(start_paused = true)]
    async fn admin_failover_happens_exactly_once() {
        // given
        let harness = Harness::new(MockVideoProvider::new());
        let alice = harness.connect("alice-t1");
        let mut bob = harness.connect("bob-t1");
        let carol = harness.connect("carol-t1");
        harness.join("lobby", &alice, "s-alice", Some("Alice"), None);
        harness.join("lobby", &bob, "s-bob", Some("Bob"), None);
        harness.join("lobby", &carol, "s-carol", Some("Carol"), None);
        settle().await;
        bob.drain();

        // when
        harness.disconnect("lobby", alice);
        tokio::time::sleep(Duration::from_secs(10)).await;

        // then
        let messages = bob.drain();
        assert_eq!(
            count(&messages, |m| matches!(m, ServerMessage::AdminChanged { .. })),
            1
        );
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::AdminChanged { new_admin_id, .. } if new_admin_id == "bob-t1"
        )));
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::UserLeft { user_id, count: 2, kicked: false, .. } if user_id == "alice-t1"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_tab_is_rejected() {
        let harness = Harness::new(MockVideoProvider::new());
        let alice = harness.connect("alice-t1");
        let mut second_tab = harness.connect("alice-t2");
        harness.join("lobby", &alice, "s-alice", Some("Alice"), None);
        settle().await;

        harness.join("lobby", &second_tab, "s-alice", Some("Alice"), None);
        settle().await;

        let messages = second_tab.drain();
        assert!(matches!(messages.as_slice(), [ServerMessage::DuplicateSession]));
        let seat = harness
            .inspect("lobby", |room| room.users[0].transport_id.clone())
            .await
            .unwrap();
        assert_eq!(seat, "alice-t1");
    }

    #[tokio::test(start_paused = true)]
    async fn password_is_required_for_new_sessions() {
        let harness = Harness::new(MockVideoProvider::new());
        let alice = harness.connect("alice-t1");
        let mut bob = harness.connect("bob-t1");
        harness.join("vault", &alice, "s-alice", Some("Alice"), Some("123456"));
        settle().await;

        harness.join("vault", &bob, "s-bob", Some("Bob"), None);
        settle().await;
        assert!(matches!(
            bob.drain().as_slice(),
            [ServerMessage::PasswordRequired { room_id }] if room_id == "vault"
        ));

        harness.join("vault", &bob, "s-bob", Some("Bob"), Some("654321"));
        settle().await;
        assert!(matches!(
            bob.drain().as_slice(),
            [ServerMessage::InvalidPassword { message, .. }] if message == "Incorrect Room PIN"
        ));

        harness.join("vault", &bob, "s-bob", Some("Bob"), Some("123456"));
        settle().await;
        assert!(bob
            .drain()
            .iter()
            .any(|m| matches!(m, ServerMessage::UserJoined { count: 2, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn kick_removes_user_immediately() {
        let harness = Harness::new(MockVideoProvider::new());
        let mut alice = harness.connect("alice-t1");
        let mut bob = harness.connect("bob-t1");
        harness.join("lobby", &alice, "s-alice", Some("Alice"), None);
        harness.join("lobby", &bob, "s-bob", Some("Bob"), None);
        settle().await;
        alice.drain();
        bob.drain();

        harness.intent("lobby", &alice, RoomIntent::KickUser("s-bob".into()));
        settle().await;

        assert!(matches!(bob.drain().as_slice(), [ServerMessage::Kicked { .. }]));
        assert!(alice.drain().iter().any(|m| matches!(
            m,
            ServerMessage::UserLeft { kicked: true, count: 1, .. }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn non_admin_cannot_kick_or_grant() {
        let harness = Harness::new(MockVideoProvider::new());
        let alice = harness.connect("alice-t1");
        let mut bob = harness.connect("bob-t1");
        harness.join("lobby", &alice, "s-alice", Some("Alice"), None);
        harness.join("lobby", &bob, "s-bob", Some("Bob"), None);
        settle().await;
        bob.drain();

        harness.intent("lobby", &bob, RoomIntent::KickUser("alice-t1".into()));
        harness.intent("lobby", &bob, RoomIntent::GrantAdmin("bob-t1".into()));
        settle().await;

        assert!(bob.drain().is_empty());
        let (users, admin) = harness
            .inspect("lobby", |room| (room.users.len(), room.admin.clone()))
            .await
            .unwrap();
        assert_eq!(users, 2);
        assert_eq!(admin.as_deref(), Some("alice-t1"));
    }

    #[tokio::test(start_paused = true)]
    async fn muted_user_gets_error_instead_of_chat() {
        let harness = Harness::new(MockVideoProvider::new());
        let mut alice = harness.connect("alice-t1");
        let mut bob = harness.connect("bob-t1");
        harness.join("lobby", &alice, "s-alice", Some("Alice"), None);
        harness.join("lobby", &bob, "s-bob", Some("Bob"), None);
        harness.intent(
            "lobby",
            &alice,
            RoomIntent::MuteUser {
                target: "bob-t1".into(),
                seconds: 60,
            },
        );
        settle().await;
        alice.drain();
        bob.drain();

        harness.intent(
            "lobby",
            &bob,
            RoomIntent::Chat {
                message: "hello".into(),
                image: None,
            },
        );
        settle().await;

        assert!(matches!(
            bob.drain().as_slice(),
            [ServerMessage::Error { code, .. }] if code == "muted"
        ));
        assert!(alice.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn huge_mute_length_is_capped() {
        // given
        let harness = Harness::new(MockVideoProvider::new());
        let mut alice = harness.connect("alice-t1");
        let bob = harness.connect("bob-t1");
        harness.join("lobby", &alice, "s-alice", Some("Alice"), None);
        harness.join("lobby", &bob, "s-bob", Some("Bob"), None);
        settle().await;
        alice.drain();

        // when
        harness.intent(
            "lobby",
            &alice,
            RoomIntent::MuteUser {
                target: "bob-t1".into(),
                seconds: u64::MAX,
            },
        );
        settle().await;

        // then: 방은 살아 있고 음소거는 하루 뒤 풀린다
        assert!(alice.drain().iter().any(|m| matches!(
            m,
            ServerMessage::ChatMessage(entry) if entry.content == "Bob was muted for 86400s."
        )));
        tokio::time::sleep(Duration::from_secs(23 * 60 * 60)).await;
        let muted = harness
            .inspect("lobby", |room| {
                room.users[1].is_muted(tokio::time::Instant::now())
            })
            .await
            .expect("room actor still running");
        assert!(muted);
        tokio::time::sleep(Duration::from_secs(2 * 60 * 60)).await;
        let muted = harness
            .inspect("lobby", |room| {
                room.users[1].is_muted(tokio::time::Instant::now())
            })
            .await
            .unwrap();
        assert!(!muted);
    }

    #[tokio::test(start_paused = true)]
    async fn connection_lost_before_join_is_processed_leaves_no_seat() {
        // given: Join 이 처리되기 전에 피어가 사라진다
        let harness = Harness::new(MockVideoProvider::new());
        let ghost = harness.connect("ghost-t1");
        harness.join("lobby", &ghost, "s-ghost", Some("Ghost"), None);
        harness.peers.remove(&ghost.id);

        // when
        tokio::time::sleep(Duration::from_secs(3)).await;

        // then
        let users = harness.inspect("lobby", |room| room.users.len()).await.unwrap();
        assert_eq!(users, 0);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(harness.registry.len(), 0);
    }
}
