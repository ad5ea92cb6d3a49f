//! The contract engine: the four transitions of the escrow session
//! state machine, executed as single serializable transactions over
//! the hub stores.
//!
//! Inputs are always validated before any state mutation. Users are
//! touched in canonical `user_id` order so that sessions sharing
//! players serialize their balance updates deterministically.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use pluto_core::amount::Amount;
use pluto_core::clock::{current_timestamp, to_rfc3339};
use pluto_core::error::{Error, Resource, Result};
use pluto_core::storage::{HubStorageT, TxnT};
use pluto_core::token::{SessionClaims, TokenCodecT};
use pluto_core::types::{
    CancelParams, CancelResponse, DepositParams, EntryKind, ExecuteParams, ExecuteResponse,
    GameSession, NewLedgerEntry, PlayerResult, SessionId, SessionPlayer, SessionStatus,
    SettleParams, SettleResponse, User, UserId, WinnerPayout, PLATFORM_ACCOUNT_ID,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::prize::{even_split, platform_fee};

pub struct ContractEngine<S> {
    storage: Arc<S>,
    codec: Arc<dyn TokenCodecT>,
}

impl<S: HubStorageT> ContractEngine<S> {
    pub fn new(storage: Arc<S>, codec: Arc<dyn TokenCodecT>) -> Self {
        Self { storage, codec }
    }

    /// Lock the entry fee of every named player and open a PENDING
    /// session. Nothing is persisted when any precondition fails.
    pub async fn execute(&self, params: ExecuteParams) -> Result<ExecuteResponse> {
        let ExecuteParams {
            contract_id,
            player_ids,
        } = params;

        let mut seen = HashSet::new();
        for player_id in &player_ids {
            if !seen.insert(player_id.as_str()) {
                return Err(Error::validation_field(
                    "playerIds",
                    format!("Duplicated player: {}", player_id),
                ));
            }
        }

        let now = current_timestamp();
        let session_id: SessionId = Uuid::new_v4().to_string();

        let session = {
            let session_id = session_id.clone();
            self.storage
                .with_txn(move |txn| {
                    let contract = txn
                        .find_contract(&contract_id)?
                        .ok_or(Error::NotFound(Resource::Contract))?;
                    if !contract.is_active {
                        return Err(Error::GameNotActive);
                    }

                    let n = player_ids.len();
                    if n < contract.min_players as usize || n > contract.max_players as usize {
                        return Err(Error::validation_field(
                            "playerIds",
                            format!(
                                "Player count {} outside {}..={}",
                                n, contract.min_players, contract.max_players
                            ),
                        ));
                    }

                    let mut users = Vec::with_capacity(n);
                    for external_id in &player_ids {
                        let user = txn
                            .find_user_by_external_auth_id(external_id)?
                            .ok_or(Error::NotFound(Resource::User))?;
                        users.push(user);
                    }
                    users.sort_by(|a, b| a.id.cmp(&b.id));

                    for user in &users {
                        if txn.has_open_session(&contract.id, &user.id)? {
                            return Err(Error::DuplicateExecution);
                        }
                        let available = user.available_balance();
                        if available < contract.entry_fee {
                            return Err(Error::InsufficientFunds {
                                required: contract.entry_fee.clone(),
                                available,
                            });
                        }
                    }

                    let session = GameSession {
                        id: session_id,
                        contract_id: contract.id.clone(),
                        status: SessionStatus::Pending,
                        total_pot: contract.entry_fee.mul_u64(n as u64),
                        created_at: now,
                        expires_at: now + contract.ttl_seconds * 1000,
                        settled_at: None,
                        players: users
                            .iter()
                            .map(|u| SessionPlayer::new(&u.id, contract.entry_fee.clone()))
                            .collect(),
                    };
                    txn.insert_session(&session)?;

                    for user in &users {
                        let locked = &user.locked_balance + &contract.entry_fee;
                        txn.update_balance(&user.id, &user.balance, &locked)?;
                        txn.append_entry(
                            NewLedgerEntry::new(
                                &user.id,
                                EntryKind::Lock,
                                contract.entry_fee.clone(),
                                user.balance.clone(),
                                now,
                            )
                            .with_session(&session.id)
                            .with_description("Entry fee lock"),
                        )?;
                    }

                    Ok(session)
                })
                .await?
        };

        let claims = SessionClaims {
            session_id: session.id.clone(),
            contract_id: session.contract_id.clone(),
            player_ids: session.players.iter().map(|p| p.user_id.clone()).collect(),
            total_pot: session.total_pot.clone(),
            expires_at: to_rfc3339(session.expires_at)?,
            iat: now / 1000,
        };
        let session_token = self
            .codec
            .mint(&claims)
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!(
            "Execute session {} on contract {}, pot {}",
            session.id, session.contract_id, session.total_pot
        );

        Ok(ExecuteResponse {
            session_id,
            session_token,
            players: session.players,
            total_pot: session.total_pot,
            expires_at: claims.expires_at,
        })
    }

    /// Resolve an open session: collect every stake, pay the winners,
    /// and record the platform fee. Exactly one terminal transition
    /// can ever commit for a session.
    pub async fn settle(&self, params: SettleParams) -> Result<SettleResponse> {
        let claims = self.codec.verify(&params.session_token)?;
        let results = params.results;
        let now = current_timestamp();

        let (session, payouts, fee) = self
            .storage
            .with_txn(move |txn| {
                let mut session = txn
                    .find_session(&claims.session_id)?
                    .ok_or(Error::NotFound(Resource::Session))?;
                session.ensure_open()?;
                if session.is_expired(now) {
                    return Err(Error::SessionExpired);
                }

                validate_results(&results, &session)?;

                let contract = txn
                    .find_contract(&session.contract_id)?
                    .ok_or(Error::NotFound(Resource::Contract))?;
                let fee = platform_fee(&session.total_pot, contract.platform_fee_bps);
                let prize_pool = session
                    .total_pot
                    .checked_sub(&fee)
                    .ok_or_else(|| Error::Internal("Fee exceeds pot".into()))?;
                let payouts = compute_payouts(&results, &prize_pool)?;
                let payout_by_user: HashMap<UserId, Amount> = payouts
                    .iter()
                    .map(|p| (p.player_id.clone(), p.win_amount.clone()))
                    .collect();
                let winner_ids: HashSet<UserId> = results
                    .iter()
                    .filter(|r| r.is_winner)
                    .map(|r| r.player_id.clone())
                    .collect();

                let mut ordered = session.players.clone();
                ordered.sort_by(|a, b| a.user_id.cmp(&b.user_id));
                for player in &ordered {
                    let user = txn
                        .find_user(&player.user_id)?
                        .ok_or(Error::NotFound(Resource::User))?;
                    let balance = sub_or_corrupt(&user.balance, &player.amount_locked, &user.id)?;
                    let locked =
                        sub_or_corrupt(&user.locked_balance, &player.amount_locked, &user.id)?;
                    txn.update_balance(&player.user_id, &balance, &locked)?;
                    txn.append_entry(
                        NewLedgerEntry::new(
                            &player.user_id,
                            EntryKind::Lose,
                            player.amount_locked.clone(),
                            balance.clone(),
                            now,
                        )
                        .with_session(&session.id)
                        .with_description("Entry fee collected"),
                    )?;

                    if let Some(win) = payout_by_user.get(&player.user_id) {
                        if !win.is_zero() {
                            let balance = &balance + win;
                            txn.update_balance(&player.user_id, &balance, &locked)?;
                            txn.append_entry(
                                NewLedgerEntry::new(
                                    &player.user_id,
                                    EntryKind::Win,
                                    win.clone(),
                                    balance.clone(),
                                    now,
                                )
                                .with_session(&session.id)
                                .with_description("Prize payout"),
                            )?;
                        }
                    }
                }

                if !fee.is_zero() {
                    let platform = txn
                        .find_user(PLATFORM_ACCOUNT_ID)?
                        .ok_or(Error::NotFound(Resource::User))?;
                    let balance = &platform.balance + &fee;
                    txn.update_balance(PLATFORM_ACCOUNT_ID, &balance, &platform.locked_balance)?;
                    txn.append_entry(
                        NewLedgerEntry::new(
                            PLATFORM_ACCOUNT_ID,
                            EntryKind::Fee,
                            fee.clone(),
                            balance,
                            now,
                        )
                        .with_session(&session.id)
                        .with_description("Platform fee"),
                    )?;
                }

                for player in session.players.iter_mut() {
                    player.is_winner = winner_ids.contains(&player.user_id);
                    player.win_amount = payout_by_user
                        .get(&player.user_id)
                        .cloned()
                        .unwrap_or_default();
                }
                session.status = SessionStatus::Settled;
                session.settled_at = Some(now);
                txn.update_session(&session)?;

                Ok((session, payouts, fee))
            })
            .await?;

        info!(
            "Settle session {}, fee {}, winners {}",
            session.id,
            fee,
            payouts.len()
        );

        Ok(SettleResponse {
            session_id: session.id,
            winners: payouts,
            platform_fee_collected: fee,
        })
    }

    /// Release every stake without charging a fee.
    pub async fn cancel(&self, params: CancelParams) -> Result<CancelResponse> {
        let claims = self.codec.verify(&params.session_token)?;
        let description = params
            .reason
            .unwrap_or_else(|| "Session cancelled".to_string());
        let (session, refunded) = self
            .terminate(claims.session_id, SessionStatus::Cancelled, description)
            .await?;

        info!("Cancel session {}", session.id);

        Ok(CancelResponse {
            session_id: session.id,
            refunded_players: refunded,
        })
    }

    /// Sweeper path: same effects as Cancel, terminal status EXPIRED.
    pub async fn expire(&self, session_id: &str) -> Result<CancelResponse> {
        let (session, refunded) = self
            .terminate(
                session_id.to_string(),
                SessionStatus::Expired,
                "Session expired".to_string(),
            )
            .await?;

        info!("Expire session {}", session.id);

        Ok(CancelResponse {
            session_id: session.id,
            refunded_players: refunded,
        })
    }

    /// Expire every overdue open session; returns the ids that were
    /// transitioned.
    pub async fn sweep_expired(&self) -> Result<Vec<SessionId>> {
        let now = current_timestamp();
        let sessions = self.storage.find_expired_sessions(now).await?;
        let mut expired = Vec::new();
        for session in sessions {
            match self.expire(&session.id).await {
                Ok(_) => expired.push(session.id),
                // Settle may have won the race; the terminal status is
                // authoritative either way.
                Err(e) => warn!("Failed to expire session {}: {}", session.id, e),
            }
        }
        Ok(expired)
    }

    /// Operator credit. Raises the total balance and appends a DEPOSIT
    /// row.
    pub async fn deposit(&self, params: DepositParams) -> Result<User> {
        if params.amount.is_zero() {
            return Err(Error::validation_field("amount", "Must be positive"));
        }
        let now = current_timestamp();
        self.storage
            .with_txn(move |txn| {
                let user = txn
                    .find_user(&params.user_id)?
                    .ok_or(Error::NotFound(Resource::User))?;
                let balance = &user.balance + &params.amount;
                txn.update_balance(&user.id, &balance, &user.locked_balance)?;
                txn.append_entry(
                    NewLedgerEntry::new(
                        &user.id,
                        EntryKind::Deposit,
                        params.amount.clone(),
                        balance,
                        now,
                    )
                    .with_description(
                        params.description.unwrap_or_else(|| "Deposit".to_string()),
                    ),
                )?;
                txn.find_user(&user.id)?.ok_or(Error::NotFound(Resource::User))
            })
            .await
    }

    async fn terminate(
        &self,
        session_id: SessionId,
        terminal: SessionStatus,
        description: String,
    ) -> Result<(GameSession, Vec<UserId>)> {
        let now = current_timestamp();
        self.storage
            .with_txn(move |txn| {
                let mut session = txn
                    .find_session(&session_id)?
                    .ok_or(Error::NotFound(Resource::Session))?;
                session.ensure_open()?;

                let mut ordered = session.players.clone();
                ordered.sort_by(|a, b| a.user_id.cmp(&b.user_id));
                let mut refunded = Vec::with_capacity(ordered.len());
                for player in &ordered {
                    let user = txn
                        .find_user(&player.user_id)?
                        .ok_or(Error::NotFound(Resource::User))?;
                    let locked =
                        sub_or_corrupt(&user.locked_balance, &player.amount_locked, &user.id)?;
                    txn.update_balance(&player.user_id, &user.balance, &locked)?;
                    txn.append_entry(
                        NewLedgerEntry::new(
                            &player.user_id,
                            EntryKind::Unlock,
                            player.amount_locked.clone(),
                            user.balance.clone(),
                            now,
                        )
                        .with_session(&session.id)
                        .with_description(description.clone()),
                    )?;
                    refunded.push(player.user_id.clone());
                }

                session.status = terminal;
                txn.update_session(&session)?;
                Ok((session, refunded))
            })
            .await
    }
}

fn sub_or_corrupt(balance: &Amount, amount: &Amount, user_id: &str) -> Result<Amount> {
    balance.checked_sub(amount).ok_or_else(|| {
        Error::Internal(format!(
            "Balance underflow for {}: {} - {}",
            user_id, balance, amount
        ))
    })
}

/// `results` must cover exactly the session's player set.
fn validate_results(results: &[PlayerResult], session: &GameSession) -> Result<()> {
    let player_ids: HashSet<&str> = session.players.iter().map(|p| p.user_id.as_str()).collect();
    let mut seen = HashSet::new();
    for result in results {
        if !player_ids.contains(result.player_id.as_str()) {
            return Err(Error::validation_field(
                "results",
                format!("Unknown player: {}", result.player_id),
            ));
        }
        if !seen.insert(result.player_id.as_str()) {
            return Err(Error::validation_field(
                "results",
                format!("Duplicated player: {}", result.player_id),
            ));
        }
    }
    if seen.len() != player_ids.len() {
        return Err(Error::validation_field(
            "results",
            "Results must cover every session player",
        ));
    }
    Ok(())
}

/// Per-winner prizes: explicit amounts when given (all-or-none, and
/// they must sum to the prize pool), the deterministic even split
/// otherwise.
fn compute_payouts(results: &[PlayerResult], prize_pool: &Amount) -> Result<Vec<WinnerPayout>> {
    let winners: Vec<&PlayerResult> = results.iter().filter(|r| r.is_winner).collect();
    if winners.is_empty() {
        return Err(Error::validation_field(
            "results",
            "At least one winner is required",
        ));
    }

    if winners.iter().all(|r| r.win_amount.is_none()) {
        let shares = even_split(prize_pool, winners.len());
        return Ok(winners
            .iter()
            .zip(shares)
            .map(|(r, win_amount)| WinnerPayout {
                player_id: r.player_id.clone(),
                win_amount,
            })
            .collect());
    }

    let mut payouts = Vec::with_capacity(winners.len());
    for result in &winners {
        let win_amount = result.win_amount.clone().ok_or_else(|| {
            Error::validation_field(
                "results",
                "Either every winner has an explicit winAmount or none",
            )
        })?;
        payouts.push(WinnerPayout {
            player_id: result.player_id.clone(),
            win_amount,
        });
    }
    let sum: Amount = payouts.iter().map(|p| p.win_amount.clone()).sum();
    if sum != *prize_pool {
        return Err(Error::validation_field(
            "results",
            format!("Win amounts sum to {}, prize pool is {}", sum, prize_pool),
        ));
    }
    Ok(payouts)
}
