//! Match Coordination
//!
//! Server-side authority over running matches. Each [`MatchCoordinator`]
//! owns one [`MatchState`] and is the only thing that mutates it; the
//! [`MatchRegistry`] hands out coordinators behind a per-match lock so at
//! most one mutation per match is ever in flight.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use crate::core::rng::DeterministicRng;
use crate::game::bot::{BotAgent, BotTurn, BOT_NAME};
use crate::game::dice::DiceRoller;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::side::{ActingSide, RemoteSide, TurnProgress};
use crate::game::state::{
    EndReason, IllegalAction, InvariantViolation, KeepOutcome, MatchState, PlayerId,
    PlayerSide, Seat, StateError, ThrowOutcome, ThrowRecord, MAX_THROWS, OPENING_MAX_THROWS,
};
use crate::game::view::{project, redact_for_opponent, view_for_owner, MatchView};
use crate::network::auth::Identity;
use crate::network::protocol::{
    ErrorCode, KeptInfo, MatchFoundInfo, MatchId, MatchMode, MatchOverInfo, OpponentInfo,
    OpponentStatusInfo, OpponentThrowInfo, RevealedInfo, RoundResultInfo, RoundThrowInfo,
    ServerMessage, ThrowResultInfo,
};

// =============================================================================
// ERRORS
// =============================================================================

/// Why a match-level request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// Turn, phase or cap violation. State is unchanged.
    #[error("illegal action: {0}")]
    IllegalAction(#[from] IllegalAction),

    /// Stale or bad match id.
    #[error("unknown match")]
    UnknownMatch,

    /// Caller is not in any match yet.
    #[error("not paired with an opponent yet")]
    NotPaired,

    /// Opponent is disconnected; the match is paused.
    #[error("opponent is unavailable")]
    PeerUnavailable,

    /// The match was terminated.
    #[error("match aborted")]
    Aborted,
}

impl MatchError {
    /// Wire error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MatchError::IllegalAction(_) => ErrorCode::IllegalAction,
            MatchError::UnknownMatch => ErrorCode::UnknownMatch,
            MatchError::NotPaired => ErrorCode::NotPaired,
            MatchError::PeerUnavailable => ErrorCode::PeerUnavailable,
            MatchError::Aborted => ErrorCode::MatchAborted,
        }
    }

    /// Rule violated, for illegal actions.
    pub fn reason(&self) -> Option<IllegalAction> {
        match self {
            MatchError::IllegalAction(reason) => Some(*reason),
            _ => None,
        }
    }
}

// =============================================================================
// SEATS
// =============================================================================

/// Connection state for reconnection support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Participant is connected.
    Connected,
    /// Participant disconnected, waiting for reconnect.
    Disconnected {
        /// When disconnection occurred.
        since: Instant,
    },
}

/// Outbound channel of a remote participant.
#[derive(Debug)]
struct ClientLink {
    sender: mpsc::Sender<ServerMessage>,
    connection: ConnectionState,
}

impl ClientLink {
    fn is_connected(&self) -> bool {
        matches!(self.connection, ConnectionState::Connected)
    }
}

/// What drives a seat, plus how to reach it.
struct SeatBinding {
    driver: Box<dyn ActingSide>,
    /// None for server-driven seats.
    link: Option<ClientLink>,
}

/// A connected participant about to be seated.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Who they are.
    pub identity: Identity,
    /// Where their messages go.
    pub sender: mpsc::Sender<ServerMessage>,
}

// =============================================================================
// MATCH COORDINATOR
// =============================================================================

/// Authority over one match.
pub struct MatchCoordinator {
    id: MatchId,
    mode: MatchMode,
    state: MatchState,
    dice: Box<dyn DiceRoller>,
    seats: [SeatBinding; 2],
    created_at: Instant,
    last_activity: Instant,
    finished_at: Option<Instant>,
}

impl MatchCoordinator {
    /// Seat `a` (seat A, starter of round 1) against `b`, or against the bot
    /// when `b` is None.
    pub fn new(
        id: MatchId,
        mode: MatchMode,
        a: Participant,
        b: Option<Participant>,
        dice: Box<dyn DiceRoller>,
    ) -> Self {
        let side_a = PlayerSide::new(a.identity.player_id, a.identity.name);
        let seat_a = SeatBinding {
            driver: Box::new(RemoteSide),
            link: Some(ClientLink {
                sender: a.sender,
                connection: ConnectionState::Connected,
            }),
        };

        let (side_b, seat_b) = match b {
            Some(b) => (
                PlayerSide::new(b.identity.player_id, b.identity.name),
                SeatBinding {
                    driver: Box::new(RemoteSide) as Box<dyn ActingSide>,
                    link: Some(ClientLink {
                        sender: b.sender,
                        connection: ConnectionState::Connected,
                    }),
                },
            ),
            None => (
                PlayerSide::new(PlayerId::random(), BOT_NAME),
                SeatBinding {
                    driver: Box::new(BotAgent::new()) as Box<dyn ActingSide>,
                    link: None,
                },
            ),
        };

        let now = Instant::now();
        Self {
            id,
            mode,
            state: MatchState::new(id, side_a, side_b),
            dice,
            seats: [seat_a, seat_b],
            created_at: now,
            last_activity: now,
            finished_at: None,
        }
    }

    /// Match identifier.
    pub fn id(&self) -> MatchId {
        self.id
    }

    /// Match mode.
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Read-only access to the authoritative state.
    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Has the match ended.
    pub fn is_finished(&self) -> bool {
        self.state.match_over
    }

    /// When the match ended.
    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    /// Last successful action.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Age of the match.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Remote participants, in seat order.
    pub fn participants(&self) -> Vec<PlayerId> {
        Seat::BOTH
            .into_iter()
            .filter(|seat| self.seats[seat.index()].link.is_some())
            .map(|seat| self.state.side(seat).id)
            .collect()
    }

    /// Send every remote participant its match-found notice.
    pub fn announce(&mut self) {
        for seat in Seat::BOTH {
            let opponent = seat.other();
            let found = ServerMessage::MatchFound(MatchFoundInfo {
                match_id: self.id,
                mode: self.mode,
                your_seat: seat,
                opponent: OpponentInfo {
                    player_id: self.state.side(opponent).id.0,
                    name: self.state.side(opponent).name.clone(),
                    is_bot: self.seats[opponent.index()].driver.is_self_driving(),
                },
                state: project(&self.state, seat),
            });
            self.send_to(seat, found);
        }
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    /// Throw for `actor`.
    pub fn submit_throw(&mut self, actor: &PlayerId, blind: bool) -> Result<ThrowOutcome, MatchError> {
        let seat = self.seat_for_action(actor)?;
        let result = self.state.throw(seat, blind, self.dice.as_mut());
        let outcome = self.settle(result)?;
        debug!(
            "Match {} seat {:?} threw {} (blind={}, {}/{})",
            hex::encode(&self.id[..4]),
            seat,
            outcome.rank,
            outcome.blind,
            outcome.throw_number,
            self.state.max_throws,
        );
        self.commit()?;
        Ok(outcome)
    }

    /// Keep for `actor`. In bot mode the bot's turn and the resolution run
    /// before this returns, and the resolved round is reported.
    pub fn keep(&mut self, actor: &PlayerId) -> Result<KeepOutcome, MatchError> {
        let seat = self.seat_for_action(actor)?;
        let result = self.state.keep(seat);
        let mut outcome = self.settle(result)?;

        for turn in self.drive()? {
            if let KeepOutcome::RoundResolved(summary) = turn.keep {
                if matches!(outcome, KeepOutcome::TurnPassed { .. }) {
                    outcome = KeepOutcome::RoundResolved(summary);
                }
            }
        }

        self.commit()?;
        Ok(outcome)
    }

    /// Reveal `actor`'s blind throw.
    pub fn reveal(&mut self, actor: &PlayerId) -> Result<ThrowRecord, MatchError> {
        let seat = self.seat_for_action(actor)?;
        let result = self.state.reveal(seat);
        let record = self.settle(result)?;
        self.commit()?;
        Ok(record)
    }

    /// Filtered snapshot for `viewer`.
    pub fn view_for(&self, viewer: &PlayerId) -> Result<MatchView, MatchError> {
        let seat = self
            .state
            .seat_of(viewer)
            .ok_or(IllegalAction::NotParticipant)?;
        Ok(project(&self.state, seat))
    }

    /// `actor` gives up; the other side wins.
    pub fn forfeit(&mut self, actor: &PlayerId) -> Result<(), MatchError> {
        let seat = self
            .state
            .seat_of(actor)
            .ok_or(IllegalAction::NotParticipant)?;
        let result = self.state.forfeit(seat);
        self.settle(result)?;
        info!(
            "Match {} forfeited by {}",
            hex::encode(&self.id[..4]),
            actor.short_hex()
        );
        self.commit()
    }

    // -------------------------------------------------------------------------
    // Connections
    // -------------------------------------------------------------------------

    /// Mark a participant disconnected. Returns false if they hold no
    /// remote seat here.
    pub fn mark_disconnected(&mut self, player_id: &PlayerId, now: Instant) -> bool {
        let Some(seat) = self.state.seat_of(player_id) else {
            return false;
        };
        let Some(link) = self.seats[seat.index()].link.as_mut() else {
            return false;
        };
        link.connection = ConnectionState::Disconnected { since: now };

        if !self.state.match_over {
            let notice = ServerMessage::OpponentStatus(OpponentStatusInfo {
                match_id: self.id,
                connected: false,
                grace_secs: None,
            });
            self.send_to(seat.other(), notice);
        }
        true
    }

    /// Attach a new connection for a returning participant and push the
    /// current state to it.
    pub fn reconnect(
        &mut self,
        player_id: &PlayerId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<MatchView, MatchError> {
        let seat = self
            .state
            .seat_of(player_id)
            .ok_or(IllegalAction::NotParticipant)?;
        let link = self.seats[seat.index()]
            .link
            .as_mut()
            .ok_or(IllegalAction::NotParticipant)?;
        link.sender = sender;
        link.connection = ConnectionState::Connected;

        let view = project(&self.state, seat);
        self.send_to(seat, ServerMessage::State(view.clone()));
        if !self.state.match_over {
            let notice = ServerMessage::OpponentStatus(OpponentStatusInfo {
                match_id: self.id,
                connected: true,
                grace_secs: None,
            });
            self.send_to(seat.other(), notice);
        }
        info!(
            "Player {} rejoined match {}",
            player_id.short_hex(),
            hex::encode(&self.id[..4])
        );
        Ok(view)
    }

    /// Is this participant's seat currently disconnected.
    pub fn is_disconnected(&self, player_id: &PlayerId) -> bool {
        self.state
            .seat_of(player_id)
            .and_then(|seat| self.seats[seat.index()].link.as_ref())
            .is_some_and(|link| !link.is_connected())
    }

    /// Forfeit a seat that stayed disconnected past `grace`.
    /// Returns the forfeiting seat.
    pub fn expire_grace(&mut self, now: Instant, grace: Duration) -> Option<Seat> {
        if self.state.match_over {
            return None;
        }
        let expired = Seat::BOTH.into_iter().find(|seat| {
            matches!(
                self.seats[seat.index()].link.as_ref().map(|l| l.connection),
                Some(ConnectionState::Disconnected { since })
                    if now.saturating_duration_since(since) > grace
            )
        })?;

        let loser = self.state.side(expired).id;
        info!(
            "Player {} did not return to match {} in time",
            loser.short_hex(),
            hex::encode(&self.id[..4])
        );
        let result = self.state.forfeit(expired);
        if self.settle(result).is_ok() {
            let _ = self.commit();
        }
        Some(expired)
    }

    /// Terminate a match nobody is playing any more.
    pub fn abandon(&mut self) {
        if self.state.match_over {
            return;
        }
        warn!("Match {} abandoned", hex::encode(&self.id[..4]));
        self.state.abort();
        self.publish();
        self.mark_finished();
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn seat_for_action(&self, actor: &PlayerId) -> Result<Seat, MatchError> {
        let seat = self
            .state
            .seat_of(actor)
            .ok_or(IllegalAction::NotParticipant)?;

        if self.state.match_over {
            return Err(match self.state.end_reason {
                Some(EndReason::Aborted) => MatchError::Aborted,
                _ => IllegalAction::MatchOver.into(),
            });
        }

        let peer = &self.seats[seat.other().index()];
        if peer.link.as_ref().is_some_and(|link| !link.is_connected()) {
            return Err(MatchError::PeerUnavailable);
        }

        Ok(seat)
    }

    /// Map a state-machine result; an invariant failure aborts the match.
    fn settle<T>(&mut self, result: Result<T, StateError>) -> Result<T, MatchError> {
        match result {
            Ok(value) => {
                self.last_activity = Instant::now();
                Ok(value)
            }
            Err(StateError::Illegal(reason)) => Err(reason.into()),
            Err(StateError::Invariant(violation)) => {
                self.abort_on(violation);
                Err(MatchError::Aborted)
            }
        }
    }

    /// Verify invariants after a mutation and push the resulting events.
    fn commit(&mut self) -> Result<(), MatchError> {
        if let Err(violation) = self.state.check_invariants() {
            self.abort_on(violation);
            return Err(MatchError::Aborted);
        }
        self.publish();
        if self.state.match_over {
            self.mark_finished();
        }
        Ok(())
    }

    fn abort_on(&mut self, violation: InvariantViolation) {
        error!(
            "Match {} invariant violated, aborting: {}",
            hex::encode(&self.id[..4]),
            violation
        );
        self.state.abort();
        self.publish();
        self.mark_finished();
    }

    fn mark_finished(&mut self) {
        if self.finished_at.is_none() {
            let now = Instant::now();
            self.finished_at = Some(now);
            debug!(
                "Match {} closed after {:?} and {} round(s)",
                hex::encode(&self.id[..4]),
                self.age(now),
                self.state.round
            );
        }
    }

    /// Let self-driving seats play while they are due.
    fn drive(&mut self) -> Result<Vec<BotTurn>, MatchError> {
        let mut turns = Vec::new();

        // A bot can play at most twice in a row: finishing a round, then
        // opening the next one as starter.
        for _ in 0..4 {
            if self.state.match_over {
                break;
            }
            let mut progressed = false;
            for seat in Seat::BOTH {
                let label = {
                    let driver = &self.seats[seat.index()].driver;
                    if !driver.is_self_driving() {
                        continue;
                    }
                    driver.label()
                };
                let result = self.seats[seat.index()]
                    .driver
                    .act(&mut self.state, seat, self.dice.as_mut());
                if let TurnProgress::Completed(turn) = self.settle(result)? {
                    debug!(
                        "Match {} {} seat {:?} played {} throw(s)",
                        hex::encode(&self.id[..4]),
                        label,
                        seat,
                        turn.throws.len()
                    );
                    turns.push(turn);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        Ok(turns)
    }

    /// Fan pending events out to both seats, then push fresh snapshots.
    fn publish(&mut self) {
        let events = self.state.take_events();
        if events.is_empty() {
            return;
        }

        for event in &events {
            match &event.data {
                GameEventData::RoundResolved(summary) => info!(
                    "Match {} round {} to {:?} ({} vs {}), lives {:?}",
                    hex::encode(&self.id[..4]),
                    summary.round,
                    summary.winner,
                    summary.throws[0].rank,
                    summary.throws[1].rank,
                    summary.lives
                ),
                GameEventData::MatchEnded { winner, reason, .. } => info!(
                    "Match {} ended: winner {:?}, reason {:?}, state {}",
                    hex::encode(&self.id[..4]),
                    winner,
                    reason,
                    hex::encode(&self.state.state_hash()[..8])
                ),
                _ => {}
            }

            for seat in Seat::BOTH {
                for message in self.messages_for(event, seat) {
                    self.send_to(seat, message);
                }
            }
        }

        for seat in Seat::BOTH {
            let view = project(&self.state, seat);
            self.send_to(seat, ServerMessage::State(view));
        }
    }

    /// Translate one event into what `viewer` is allowed to receive.
    fn messages_for(&self, event: &GameEvent, viewer: Seat) -> Vec<ServerMessage> {
        let match_id = self.id;
        let version = event.version;

        match &event.data {
            GameEventData::ThrowMade(outcome) => {
                let record = ThrowRecord {
                    round: event.round,
                    throw_number: outcome.throw_number,
                    dice: outcome.dice,
                    rank: outcome.rank,
                    blind: outcome.blind,
                };
                if outcome.seat == viewer {
                    let cap = if event.round == 1 { OPENING_MAX_THROWS } else { MAX_THROWS };
                    vec![ServerMessage::ThrowResult(ThrowResultInfo {
                        match_id,
                        throw: view_for_owner(&record),
                        is_last_throw: outcome.is_last_throw,
                        throws_left: cap.saturating_sub(outcome.throw_number),
                        version,
                    })]
                } else {
                    vec![ServerMessage::OpponentThrew(OpponentThrowInfo {
                        match_id,
                        seat: outcome.seat,
                        throw: redact_for_opponent(&record),
                        is_last_throw: outcome.is_last_throw,
                        version,
                    })]
                }
            }
            GameEventData::Kept { seat, next_turn, .. } => {
                vec![ServerMessage::Kept(KeptInfo {
                    match_id,
                    seat: *seat,
                    next_turn: *next_turn,
                    version,
                })]
            }
            GameEventData::Revealed { seat, dice, rank } => {
                vec![ServerMessage::Revealed(RevealedInfo {
                    match_id,
                    seat: *seat,
                    dice: *dice,
                    rank: *rank,
                    display_value: rank.to_string(),
                    version,
                })]
            }
            GameEventData::RoundResolved(summary) => {
                let throws = Seat::BOTH
                    .into_iter()
                    .map(|seat| {
                        let kept = summary.throws[seat.index()];
                        RoundThrowInfo {
                            seat,
                            dice: kept.dice,
                            rank: kept.rank,
                            display_value: kept.rank.to_string(),
                            throws: kept.throws,
                            lives: summary.lives[seat.index()],
                            lives_delta: if seat == summary.loser { -1 } else { 0 },
                        }
                    })
                    .collect();
                vec![ServerMessage::RoundResult(RoundResultInfo {
                    match_id,
                    round: summary.round,
                    starter: summary.starter,
                    throws,
                    winner: summary.winner,
                    next_starter: summary.next_starter,
                    version,
                })]
            }
            GameEventData::MatchEnded { winner, reason, lives } => {
                vec![ServerMessage::MatchOver(MatchOverInfo {
                    match_id,
                    winner_id: winner.map(|seat| self.state.side(seat).id.0),
                    winner_seat: *winner,
                    reason: *reason,
                    final_lives: *lives,
                    rounds: event.round,
                })]
            }
        }
    }

    fn send_to(&self, seat: Seat, message: ServerMessage) {
        let Some(link) = self.seats[seat.index()].link.as_ref() else {
            return;
        };
        if !link.is_connected() {
            return;
        }
        match link.sender.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Outbound queue full for {} in match {}",
                    self.state.side(seat).id.short_hex(),
                    hex::encode(&self.id[..4])
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    "Outbound channel closed for {}",
                    self.state.side(seat).id.short_hex()
                );
            }
        }
    }

    #[cfg(test)]
    fn state_mut(&mut self) -> &mut MatchState {
        &mut self.state
    }
}

// =============================================================================
// MATCH REGISTRY
// =============================================================================

/// Lifetimes applied by [`MatchRegistry::sweep`].
#[derive(Debug, Clone, Copy)]
pub struct SweepPolicy {
    /// How long a disconnected participant may stay away.
    pub reconnect_grace: Duration,
    /// How long a finished match stays queryable.
    pub finished_linger: Duration,
    /// Inactivity after which a running match is abandoned.
    pub abandoned_ttl: Duration,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(30),
            finished_linger: Duration::from_secs(60),
            abandoned_ttl: Duration::from_secs(1800),
        }
    }
}

/// What a sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Matches forfeited on grace expiry.
    pub forfeited: Vec<MatchId>,
    /// Running matches terminated for inactivity.
    pub abandoned: Vec<MatchId>,
    /// Matches dropped from the registry.
    pub removed: Vec<MatchId>,
}

/// All running and recently finished matches.
pub struct MatchRegistry {
    /// Matches by id.
    matches: RwLock<BTreeMap<MatchId, Arc<RwLock<MatchCoordinator>>>>,
    /// Participant to match mapping.
    player_matches: RwLock<BTreeMap<PlayerId, MatchId>>,
}

impl MatchRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            matches: RwLock::new(BTreeMap::new()),
            player_matches: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a match with a freshly seeded dice stream and announce it.
    pub async fn create_match(
        &self,
        mode: MatchMode,
        a: Participant,
        b: Option<Participant>,
    ) -> (MatchId, Arc<RwLock<MatchCoordinator>>) {
        let id = uuid::Uuid::new_v4().into_bytes();
        let entropy = uuid::Uuid::new_v4().into_bytes();
        let mut player_ids = vec![a.identity.player_id.0];
        if let Some(b) = &b {
            player_ids.push(b.identity.player_id.0);
        }
        let dice = DeterministicRng::from_match_params(&entropy, &id, &player_ids);
        let coordinator = self.insert(id, mode, a, b, Box::new(dice)).await;
        (id, coordinator)
    }

    /// Create a match on a caller-supplied dice stream and announce it.
    pub async fn insert(
        &self,
        id: MatchId,
        mode: MatchMode,
        a: Participant,
        b: Option<Participant>,
        dice: Box<dyn DiceRoller>,
    ) -> Arc<RwLock<MatchCoordinator>> {
        let mut coordinator = MatchCoordinator::new(id, mode, a, b, dice);
        coordinator.announce();
        let participants = coordinator.participants();
        let coordinator = Arc::new(RwLock::new(coordinator));

        self.matches.write().await.insert(id, coordinator.clone());
        {
            let mut player_matches = self.player_matches.write().await;
            for player_id in &participants {
                player_matches.insert(*player_id, id);
            }
        }

        info!(
            "Created {:?} match {} for {}",
            mode,
            hex::encode(&id[..4]),
            participants
                .iter()
                .map(|p| p.short_hex())
                .collect::<Vec<_>>()
                .join(" vs ")
        );
        coordinator
    }

    /// Get a match by ID.
    pub async fn get(&self, id: &MatchId) -> Option<Arc<RwLock<MatchCoordinator>>> {
        self.matches.read().await.get(id).cloned()
    }

    /// Match a player was last seated in, finished or not.
    pub async fn match_for_player(
        &self,
        player_id: &PlayerId,
    ) -> Option<(MatchId, Arc<RwLock<MatchCoordinator>>)> {
        let id = *self.player_matches.read().await.get(player_id)?;
        self.get(&id).await.map(|c| (id, c))
    }

    /// Match a player is currently playing, if it has not ended.
    pub async fn active_match_for_player(
        &self,
        player_id: &PlayerId,
    ) -> Option<(MatchId, Arc<RwLock<MatchCoordinator>>)> {
        let (id, coordinator) = self.match_for_player(player_id).await?;
        let finished = coordinator.read().await.is_finished();
        (!finished).then_some((id, coordinator))
    }

    /// Resolve the coordinator `player_id` may act on under `match_id`.
    pub async fn resolve(
        &self,
        player_id: &PlayerId,
        match_id: &MatchId,
    ) -> Result<Arc<RwLock<MatchCoordinator>>, MatchError> {
        let current = self
            .player_matches
            .read()
            .await
            .get(player_id)
            .copied()
            .ok_or(MatchError::NotPaired)?;
        if current != *match_id {
            return Err(MatchError::UnknownMatch);
        }
        self.get(match_id).await.ok_or(MatchError::UnknownMatch)
    }

    /// Remove a match and its participant mappings.
    pub async fn remove(&self, id: &MatchId) {
        self.matches.write().await.remove(id);
        self.player_matches.write().await.retain(|_, m| m != id);
    }

    /// Get active match count.
    pub async fn match_count(&self) -> usize {
        self.matches.read().await.len()
    }

    /// Apply grace forfeits, abandon idle matches, and drop finished ones
    /// past their linger period.
    pub async fn sweep(&self, now: Instant, policy: &SweepPolicy) -> SweepReport {
        let mut report = SweepReport::default();
        let entries: Vec<(MatchId, Arc<RwLock<MatchCoordinator>>)> = self
            .matches
            .read()
            .await
            .iter()
            .map(|(id, c)| (*id, c.clone()))
            .collect();

        for (id, coordinator) in entries {
            let mut c = coordinator.write().await;

            if c.expire_grace(now, policy.reconnect_grace).is_some() {
                report.forfeited.push(id);
            }

            if !c.is_finished()
                && now.saturating_duration_since(c.last_activity()) > policy.abandoned_ttl
            {
                c.abandon();
                report.abandoned.push(id);
                report.removed.push(id);
                continue;
            }

            let expired = c
                .finished_at()
                .is_some_and(|at| now.saturating_duration_since(at) > policy.finished_linger);
            if expired {
                report.removed.push(id);
            }
        }

        for id in &report.removed {
            self.remove(id).await;
        }

        if !report.removed.is_empty() || !report.forfeited.is_empty() {
            debug!(
                "Sweep: {} forfeited, {} abandoned, {} removed",
                report.forfeited.len(),
                report.abandoned.len(),
                report.removed.len()
            );
        }
        report
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::dice::ScriptedDice;
    use crate::game::state::MatchPhase;
    use crate::game::rank::DiceRank;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_coordinator_handle_is_shareable() {
        // Connection and sweep tasks hold the handle across awaits
        assert_send_sync::<MatchCoordinator>();
        assert_send_sync::<Arc<RwLock<MatchCoordinator>>>();
        assert_send_sync::<MatchRegistry>();
    }

    fn participant(byte: u8, name: &str) -> (Participant, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(256);
        let p = Participant {
            identity: Identity {
                player_id: PlayerId::new([byte; 16]),
                name: name.to_string(),
            },
            sender: tx,
        };
        (p, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn bot_match(script: &[(u8, u8)]) -> (MatchCoordinator, mpsc::Receiver<ServerMessage>) {
        let (a, rx) = participant(1, "ana");
        let mut c = MatchCoordinator::new(
            [9; 16],
            MatchMode::Bot,
            a,
            None,
            Box::new(ScriptedDice::new(script.iter().copied())),
        );
        c.announce();
        (c, rx)
    }

    fn versus_match(
        script: &[(u8, u8)],
    ) -> (MatchCoordinator, mpsc::Receiver<ServerMessage>, mpsc::Receiver<ServerMessage>) {
        let (a, rx_a) = participant(1, "ana");
        let (b, rx_b) = participant(2, "bram");
        let mut c = MatchCoordinator::new(
            [8; 16],
            MatchMode::Versus,
            a,
            Some(b),
            Box::new(ScriptedDice::new(script.iter().copied())),
        );
        c.announce();
        (c, rx_a, rx_b)
    }

    const ANA: PlayerId = PlayerId::new([1; 16]);
    const BRAM: PlayerId = PlayerId::new([2; 16]);

    #[test]
    fn test_announce_match_found() {
        let (_c, mut rx_a, mut rx_b) = versus_match(&[]);
        let a_msgs = drain(&mut rx_a);
        assert_eq!(a_msgs.len(), 1);
        match &a_msgs[0] {
            ServerMessage::MatchFound(info) => {
                assert_eq!(info.your_seat, Seat::A);
                assert_eq!(info.opponent.name, "bram");
                assert!(!info.opponent.is_bot);
                assert_eq!(info.state.phase, MatchPhase::AwaitingBlindOpen);
            }
            other => panic!("expected match_found, got {:?}", other),
        }
        assert!(matches!(drain(&mut rx_b)[0], ServerMessage::MatchFound(ref i) if i.your_seat == Seat::B));
    }

    #[test]
    fn test_bot_match_keep_returns_round_outcome() {
        // Human Mexico, bot (3,3), then bot opens round 2 with 65
        let (mut c, mut rx) = bot_match(&[(1, 2), (3, 3), (6, 5)]);
        drain(&mut rx);

        let thrown = c.submit_throw(&ANA, true).unwrap();
        assert_eq!(thrown.rank, DiceRank(1000));

        let outcome = c.keep(&ANA).unwrap();
        let summary = match outcome {
            KeepOutcome::RoundResolved(summary) => summary,
            other => panic!("expected round outcome, got {:?}", other),
        };
        assert_eq!(summary.winner, Seat::A);
        assert_eq!(summary.lives, [6, 5]);

        // Bot is round 2 starter and has already played
        let state = c.state();
        assert_eq!(state.round, 2);
        assert_eq!(state.starter, Seat::B);
        assert_eq!(state.turn, Some(Seat::A));
        assert_eq!(state.side(Seat::B).current.map(|t| t.rank), Some(DiceRank(65)));
        assert!(state.side(Seat::B).kept);

        let msgs = drain(&mut rx);
        assert!(msgs.iter().any(|m| matches!(m, ServerMessage::RoundResult(r) if r.winner == Seat::A)));
        let bot_opening = msgs.iter().find_map(|m| match m {
            ServerMessage::OpponentThrew(info) if info.throw.round == 1 => Some(info.throw.clone()),
            _ => None,
        });
        let bot_opening = bot_opening.unwrap();
        assert!(bot_opening.blind);
        assert_eq!(bot_opening.rank, None);
        assert_eq!(bot_opening.dice, None);
    }

    #[test]
    fn test_versus_opening_is_simultaneous() {
        // Dice are consumed in call order: B throws (3,3), A throws Mexico
        let (mut c, mut rx_a, mut rx_b) = versus_match(&[(3, 3), (1, 2)]);
        drain(&mut rx_a);
        drain(&mut rx_b);

        // B acts first even though A is the starter
        c.submit_throw(&BRAM, true).unwrap();
        assert_eq!(c.keep(&BRAM).unwrap(), KeepOutcome::TurnPassed { to: None });
        c.submit_throw(&ANA, true).unwrap();

        // A's blind throw is not visible to B
        let view_b = c.view_for(&BRAM).unwrap();
        let a_current = view_b.opponent.current.unwrap();
        assert_eq!(a_current.rank, None);
        for msg in drain(&mut rx_b) {
            if let ServerMessage::OpponentThrew(info) = msg {
                assert_eq!(info.throw.rank, None);
                assert_eq!(info.throw.dice, None);
            }
        }

        match c.keep(&ANA).unwrap() {
            KeepOutcome::RoundResolved(summary) => {
                assert_eq!(summary.throws[0].rank, DiceRank(1000));
                assert_eq!(summary.throws[1].rank, DiceRank(300));
                assert_eq!(summary.lives, [6, 5]);
                assert_eq!(summary.next_starter, Some(Seat::B));
            }
            other => panic!("expected resolution, got {:?}", other),
        }

        let a_msgs = drain(&mut rx_a);
        let result = a_msgs.iter().find_map(|m| match m {
            ServerMessage::RoundResult(r) => Some(r.clone()),
            _ => None,
        });
        let result = result.unwrap();
        assert_eq!(result.throws[1].lives_delta, -1);
        assert_eq!(result.throws[0].display_value, "Mexico");
    }

    #[test]
    fn test_illegal_action_leaves_state_unchanged() {
        let (mut c, _rx_a, _rx_b) = versus_match(&[(4, 4), (5, 5)]);
        c.submit_throw(&ANA, true).unwrap();
        let version = c.state().version;

        let err = c.submit_throw(&ANA, true).unwrap_err();
        assert_eq!(err, MatchError::IllegalAction(IllegalAction::ThrowCapReached));
        assert_eq!(err.code(), ErrorCode::IllegalAction);
        assert_eq!(err.reason(), Some(IllegalAction::ThrowCapReached));
        assert_eq!(c.state().version, version);

        let err = c.submit_throw(&BRAM, false).unwrap_err();
        assert_eq!(err.reason(), Some(IllegalAction::BlindRequired));

        let stranger = PlayerId::new([77; 16]);
        assert_eq!(
            c.keep(&stranger).unwrap_err(),
            MatchError::IllegalAction(IllegalAction::NotParticipant)
        );
    }

    #[test]
    fn test_peer_unavailable_pauses_match() {
        let (mut c, _rx_a, mut rx_b) = versus_match(&[(4, 4)]);
        let now = Instant::now();

        assert!(c.mark_disconnected(&ANA, now));
        assert!(c.is_disconnected(&ANA));
        let notices = drain(&mut rx_b);
        assert!(notices.iter().any(|m| matches!(m, ServerMessage::OpponentStatus(s) if !s.connected)));

        assert_eq!(c.submit_throw(&BRAM, true).unwrap_err(), MatchError::PeerUnavailable);
        // Reads are still served
        assert!(c.view_for(&BRAM).is_ok());

        let (tx, mut new_rx) = mpsc::channel(16);
        let view = c.reconnect(&ANA, tx).unwrap();
        assert_eq!(view.your_seat, Seat::A);
        assert!(matches!(drain(&mut new_rx)[0], ServerMessage::State(_)));
        assert!(c.submit_throw(&BRAM, true).is_ok());
    }

    #[test]
    fn test_grace_expiry_forfeits() {
        let (mut c, _rx_a, mut rx_b) = versus_match(&[]);
        let t0 = Instant::now();
        c.mark_disconnected(&ANA, t0);
        drain(&mut rx_b);

        let grace = Duration::from_secs(30);
        assert_eq!(c.expire_grace(t0 + Duration::from_secs(10), grace), None);
        assert_eq!(c.expire_grace(t0 + Duration::from_secs(31), grace), Some(Seat::A));

        assert!(c.is_finished());
        assert_eq!(c.state().winner, Some(Seat::B));
        assert_eq!(c.state().end_reason, Some(EndReason::Forfeit));
        let msgs = drain(&mut rx_b);
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMessage::MatchOver(info) if info.winner_id == Some(BRAM.0) && info.reason == EndReason::Forfeit
        )));
    }

    #[test]
    fn test_invariant_violation_aborts_match() {
        let (mut c, mut rx_a, mut rx_b) = versus_match(&[(4, 4)]);
        drain(&mut rx_a);
        drain(&mut rx_b);

        // Corrupt: a single turn holder during the simultaneous opening
        c.state_mut().turn = Some(Seat::B);
        let err = c.submit_throw(&ANA, true).unwrap_err();
        assert_eq!(err, MatchError::Aborted);
        assert!(c.is_finished());
        assert_eq!(c.state().end_reason, Some(EndReason::Aborted));
        assert_eq!(c.state().winner, None);

        for rx in [&mut rx_a, &mut rx_b] {
            let msgs = drain(rx);
            assert!(msgs.iter().any(|m| matches!(
                m,
                ServerMessage::MatchOver(info) if info.reason == EndReason::Aborted
            )));
        }

        assert_eq!(c.keep(&BRAM).unwrap_err(), MatchError::Aborted);
    }

    #[test]
    fn test_leave_forfeits() {
        let (mut c, _rx_a, _rx_b) = versus_match(&[]);
        c.forfeit(&BRAM).unwrap();
        assert_eq!(c.state().winner, Some(Seat::A));
        assert_eq!(
            c.forfeit(&ANA).unwrap_err(),
            MatchError::IllegalAction(IllegalAction::MatchOver)
        );
        assert!(c.finished_at().is_some());
    }

    #[test]
    fn test_full_bot_match_reaches_end() {
        let (a, mut rx) = participant(1, "ana");
        let mut c = MatchCoordinator::new(
            [5; 16],
            MatchMode::Bot,
            a,
            None,
            Box::new(DeterministicRng::new(42)),
        );

        let mut steps = 0;
        while !c.is_finished() {
            steps += 1;
            assert!(steps < 500, "match did not terminate");
            let view = c.view_for(&ANA).unwrap();
            assert!(view.your_move, "human should always be due between calls");
            c.submit_throw(&ANA, view.first_round).unwrap();
            c.keep(&ANA).unwrap();
            assert!(c.state().check_invariants().is_ok());
        }

        let state = c.state();
        assert_eq!(state.end_reason, Some(EndReason::LivesExhausted));
        let lives = [state.sides[0].lives, state.sides[1].lives];
        assert!(lives.contains(&0));
        let over = drain(&mut rx)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::MatchOver(_)))
            .count();
        assert_eq!(over, 1);
    }

    #[tokio::test]
    async fn test_registry_resolution() {
        let registry = MatchRegistry::new();
        let (a, _rx_a) = participant(1, "ana");
        let (b, _rx_b) = participant(2, "bram");

        let stranger = PlayerId::new([3; 16]);
        assert!(matches!(
            registry.resolve(&stranger, &[0; 16]).await,
            Err(MatchError::NotPaired)
        ));

        let (id, _) = registry.create_match(MatchMode::Versus, a, Some(b)).await;
        assert_eq!(registry.match_count().await, 1);
        assert!(registry.resolve(&ANA, &id).await.is_ok());
        assert!(registry.resolve(&BRAM, &id).await.is_ok());
        assert!(matches!(
            registry.resolve(&ANA, &[0; 16]).await,
            Err(MatchError::UnknownMatch)
        ));
        assert!(registry.active_match_for_player(&ANA).await.is_some());

        registry.remove(&id).await;
        assert_eq!(registry.match_count().await, 0);
        assert!(registry.match_for_player(&ANA).await.is_none());
    }

    #[tokio::test]
    async fn test_registry_bot_match_maps_only_human() {
        let registry = MatchRegistry::new();
        let (a, mut rx) = participant(1, "ana");
        let (id, coordinator) = registry.create_match(MatchMode::Bot, a, None).await;

        assert_eq!(coordinator.read().await.participants(), vec![ANA]);
        assert_eq!(registry.match_for_player(&ANA).await.map(|(m, _)| m), Some(id));
        match rx.try_recv().unwrap() {
            ServerMessage::MatchFound(info) => {
                assert!(info.opponent.is_bot);
                assert_eq!(info.opponent.name, BOT_NAME);
            }
            other => panic!("expected match_found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sweep_lifecycle() {
        let registry = MatchRegistry::new();
        let policy = SweepPolicy {
            reconnect_grace: Duration::from_secs(30),
            finished_linger: Duration::from_secs(60),
            abandoned_ttl: Duration::from_secs(600),
        };

        let (a, _rx_a) = participant(1, "ana");
        let (b, _rx_b) = participant(2, "bram");
        let id = [1; 16];
        let coordinator = registry
            .insert(id, MatchMode::Versus, a, Some(b), Box::new(ScriptedDice::new([])))
            .await;

        let t0 = Instant::now();
        coordinator.write().await.mark_disconnected(&ANA, t0);

        let report = registry.sweep(t0 + Duration::from_secs(5), &policy).await;
        assert!(report.forfeited.is_empty());

        let report = registry.sweep(t0 + Duration::from_secs(31), &policy).await;
        assert_eq!(report.forfeited, vec![id]);
        assert!(report.removed.is_empty());
        assert!(coordinator.read().await.is_finished());

        let finished = coordinator.read().await.finished_at().unwrap();
        let report = registry.sweep(finished + Duration::from_secs(61), &policy).await;
        assert_eq!(report.removed, vec![id]);
        assert_eq!(registry.match_count().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_abandons_idle_match() {
        let registry = MatchRegistry::new();
        let policy = SweepPolicy {
            abandoned_ttl: Duration::from_secs(10),
            ..Default::default()
        };
        let (a, _rx) = participant(1, "ana");
        let (id, coordinator) = registry.create_match(MatchMode::Bot, a, None).await;

        let later = coordinator.read().await.last_activity() + Duration::from_secs(11);
        let report = registry.sweep(later, &policy).await;
        assert_eq!(report.abandoned, vec![id]);
        assert_eq!(registry.match_count().await, 0);
        assert_eq!(coordinator.read().await.state().end_reason, Some(EndReason::Aborted));
    }
}
