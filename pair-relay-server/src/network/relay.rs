//! Relay
//!
//! Glue between decoded client events and the matchmaker. Each handler runs
//! one matchmaker operation and turns its result into deliveries through a
//! [`Transport`].

use tracing::{debug, error, instrument, warn};

use crate::game::matchmaking::{JoinRequest, MatchError, Matchmaker};
use crate::game::participant::{Participant, ParticipantId};
use crate::network::protocol::{ClientMessage, JoinAck, JoinPayload, MovePayload, ServerMessage};
use crate::network::transport::Transport;

/// Reply for join failures that are not the client's fault.
pub const JOIN_FAILED_MESSAGE: &str = "An error occurred while joining the game.";

/// Matchmaker plus the transport it reports through.
pub struct Relay<T: Transport> {
    matchmaker: Matchmaker,
    transport: T,
}

impl<T: Transport> Relay<T> {
    /// Create a relay around a matchmaker and transport.
    pub fn new(matchmaker: Matchmaker, transport: T) -> Self {
        Self {
            matchmaker,
            transport,
        }
    }

    /// Session state.
    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Dispatch a decoded client message.
    pub fn handle_message(&mut self, conn: ParticipantId, msg: ClientMessage) {
        match msg {
            ClientMessage::Join(join) => {
                self.handle_join(conn, join);
            }
            ClientMessage::Move(mv) => {
                self.handle_move(conn, mv);
            }
            ClientMessage::Leave => {
                self.handle_leave(conn);
            }
            ClientMessage::Ping { timestamp } => {
                self.transport.unicast(
                    conn,
                    ServerMessage::Pong {
                        timestamp,
                        server_time: chrono::Utc::now().timestamp_millis(),
                    },
                );
            }
        }
    }

    /// Handle a join request and announce the result.
    #[instrument(skip(self, conn, join), fields(conn = %conn.short()))]
    pub fn handle_join(&mut self, conn: ParticipantId, join: JoinPayload) -> JoinAck {
        let request = JoinRequest {
            name: join.name,
            participant_id: conn,
            session_id: join.session_id,
        };

        let outcome = match self.matchmaker.join(request) {
            Ok(outcome) => outcome,
            Err(e) => {
                let ack = JoinAck::rejected(join_error_text(&e));
                self.transport.unicast(conn, ServerMessage::JoinAck(ack.clone()));
                return ack;
            }
        };

        let player = &outcome.participant;
        let game = player.session_id.as_str();

        self.transport.join_group(conn, game);

        let ack = JoinAck::accepted(player.role);
        self.transport.unicast(conn, ServerMessage::JoinAck(ack.clone()));

        self.transport.unicast(
            conn,
            ServerMessage::Welcome {
                message: format!("Hello {}, Welcome to the game", player.name),
                opponent: outcome.opponent.as_ref().map(Participant::info),
            },
        );

        self.transport.broadcast(
            game,
            Some(conn),
            ServerMessage::OpponentJoin {
                message: format!("{} has joined the game.", player.name),
                opponent: player.info(),
            },
        );

        if let Some(start) = self.matchmaker.game_start(game) {
            self.transport.broadcast(
                game,
                None,
                ServerMessage::message(format!(
                    "Let's start the game. {} ({}) goes first",
                    start.first.role.color_name(),
                    start.first.name
                )),
            );
        }

        ack
    }

    /// Forward a move to the rest of its group.
    pub fn handle_move(&mut self, conn: ParticipantId, mv: MovePayload) {
        match self.matchmaker.relay_move(conn, mv.into_request()) {
            Ok(relay) => {
                self.transport.broadcast(
                    &relay.session_id,
                    Some(relay.sender),
                    ServerMessage::OpponentMove {
                        from: relay.from,
                        to: relay.to,
                    },
                );
            }
            Err(e) => {
                debug!("Move from {} dropped: {}", conn.short(), e);
            }
        }
    }

    /// Explicit leave. The connection stays open and may join again.
    pub fn handle_leave(&mut self, conn: ParticipantId) -> Option<Participant> {
        let player = self.depart(conn)?;
        self.transport.leave_group(conn, &player.session_id);
        Some(player)
    }

    /// Connection closed. Always treated as a leave.
    pub fn handle_disconnect(&mut self, conn: ParticipantId) -> Option<Participant> {
        self.handle_leave(conn)
    }

    fn depart(&mut self, conn: ParticipantId) -> Option<Participant> {
        let player = self.matchmaker.leave(&conn)?;
        let game = player.session_id.as_str();

        self.transport.broadcast(
            game,
            Some(conn),
            ServerMessage::message(format!("{} has left the game.", player.name)),
        );
        self.transport.broadcast(game, Some(conn), ServerMessage::OpponentLeft);

        Some(player)
    }

    /// Clear every session. Returns the participants that were seated.
    pub fn shutdown(&mut self) -> Vec<Participant> {
        let dropped = self.matchmaker.shutdown();
        for player in &dropped {
            self.transport.leave_group(player.id, &player.session_id);
        }
        dropped
    }
}

/// Text sent back to a rejected joiner.
fn join_error_text(e: &MatchError) -> String {
    match e {
        MatchError::SessionFull | MatchError::AlreadyJoined | MatchError::InvalidJoin(_) => {
            warn!("Join rejected: {}", e);
            e.to_string()
        }
        MatchError::Registry(_) | MatchError::NotMember(_) => {
            error!("Error in join: {}", e);
            JOIN_FAILED_MESSAGE.to_string()
        }
    }
}
