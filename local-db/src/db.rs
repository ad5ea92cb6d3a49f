//! Database related code for the hub stores.
//! Plain CRUD functions over a borrowed connection; transaction scope
//! is decided by the caller.

use pluto_core::amount::Amount;
use pluto_core::error::{Error, Resource, Result};
use pluto_core::types::{
    BalanceSnapshot, Contract, EntryKind, Game, GameSession, LedgerEntry, Lobby, LobbyPlayer,
    LobbyStatus, NewLedgerEntry, SessionPlayer, SessionStatus, User,
};
use rusqlite::{params, Connection, OptionalExtension};

fn storage_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

fn parse_amount(s: &str) -> Result<Amount> {
    s.parse()
        .map_err(|_| Error::Storage(format!("Corrupt amount column: {}", s)))
}

pub fn prepare_all_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            external_auth_id TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            balance TEXT NOT NULL,
            locked_balance TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(storage_err)?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS users_display_name
         ON users (lower(display_name))",
        [],
    )
    .map_err(storage_err)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            amount TEXT NOT NULL,
            balance_after TEXT NOT NULL,
            session_id TEXT,
            description TEXT,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id)
        )",
        [],
    )
    .map_err(storage_err)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS ledger_entries_user
         ON ledger_entries (user_id, created_at DESC, id DESC)",
        [],
    )
    .map_err(storage_err)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS ledger_entries_session
         ON ledger_entries (session_id)",
        [],
    )
    .map_err(storage_err)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS games (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            client_secret_digest TEXT NOT NULL,
            callback_url TEXT,
            is_active INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(storage_err)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS contracts (
            id TEXT PRIMARY KEY,
            game_id TEXT NOT NULL,
            name TEXT NOT NULL,
            entry_fee TEXT NOT NULL,
            platform_fee_bps INTEGER NOT NULL,
            min_players INTEGER NOT NULL,
            max_players INTEGER NOT NULL,
            ttl_seconds INTEGER NOT NULL,
            is_active INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (game_id) REFERENCES games(id)
        )",
        [],
    )
    .map_err(storage_err)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS game_sessions (
            id TEXT PRIMARY KEY,
            contract_id TEXT NOT NULL,
            status TEXT NOT NULL,
            total_pot TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            settled_at INTEGER,
            FOREIGN KEY (contract_id) REFERENCES contracts(id)
        )",
        [],
    )
    .map_err(storage_err)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS game_sessions_expiry
         ON game_sessions (status, expires_at)",
        [],
    )
    .map_err(storage_err)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS session_players (
            session_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            amount_locked TEXT NOT NULL,
            is_winner INTEGER NOT NULL,
            win_amount TEXT NOT NULL,
            PRIMARY KEY (session_id, user_id),
            FOREIGN KEY (session_id) REFERENCES game_sessions(id)
        )",
        [],
    )
    .map_err(storage_err)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lobbies (
            id TEXT PRIMARY KEY,
            contract_id TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            session_id TEXT,
            players TEXT NOT NULL, -- JSON serialized
            FOREIGN KEY (contract_id) REFERENCES contracts(id)
        )",
        [],
    )
    .map_err(storage_err)?;

    Ok(())
}

// CRUD functions for User

pub fn create_user(conn: &Connection, user: &User) -> Result<()> {
    if read_user_by_display_name(conn, &user.display_name)?.is_some() {
        return Err(Error::DisplayNameTaken(user.display_name.clone()));
    }
    conn.execute(
        "INSERT INTO users (id, external_auth_id, display_name, balance, locked_balance, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.id,
            user.external_auth_id,
            user.display_name,
            user.balance.to_string(),
            user.locked_balance.to_string(),
            user.created_at,
        ],
    )
    .map_err(storage_err)?;
    Ok(())
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<(User, String, String)> {
    let user = User {
        id: row.get(0)?,
        external_auth_id: row.get(1)?,
        display_name: row.get(2)?,
        balance: Amount::zero(),
        locked_balance: Amount::zero(),
        created_at: row.get(5)?,
    };
    let balance: String = row.get(3)?;
    let locked: String = row.get(4)?;
    Ok((user, balance, locked))
}

const USER_COLUMNS: &str =
    "id, external_auth_id, display_name, balance, locked_balance, created_at";

fn finish_user(raw: (User, String, String)) -> Result<User> {
    let (mut user, balance, locked) = raw;
    user.balance = parse_amount(&balance)?;
    user.locked_balance = parse_amount(&locked)?;
    Ok(user)
}

pub fn read_user(conn: &Connection, user_id: &str) -> Result<Option<User>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))
        .map_err(storage_err)?;
    let raw = stmt
        .query_row(params![user_id], row_to_user)
        .optional()
        .map_err(storage_err)?;
    raw.map(finish_user).transpose()
}

pub fn read_user_by_external_auth_id(
    conn: &Connection,
    external_auth_id: &str,
) -> Result<Option<User>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM users WHERE external_auth_id = ?1",
            USER_COLUMNS
        ))
        .map_err(storage_err)?;
    let raw = stmt
        .query_row(params![external_auth_id], row_to_user)
        .optional()
        .map_err(storage_err)?;
    raw.map(finish_user).transpose()
}

pub fn read_user_by_display_name(conn: &Connection, display_name: &str) -> Result<Option<User>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM users WHERE lower(display_name) = lower(?1)",
            USER_COLUMNS
        ))
        .map_err(storage_err)?;
    let raw = stmt
        .query_row(params![display_name], row_to_user)
        .optional()
        .map_err(storage_err)?;
    raw.map(finish_user).transpose()
}

pub fn read_users_by_ids(conn: &Connection, user_ids: &[String]) -> Result<Vec<User>> {
    let mut users = Vec::with_capacity(user_ids.len());
    for user_id in user_ids {
        if let Some(user) = read_user(conn, user_id)? {
            users.push(user);
        }
    }
    Ok(users)
}

pub fn update_user_display_name(
    conn: &Connection,
    user_id: &str,
    display_name: &str,
) -> Result<User> {
    if let Some(existing) = read_user_by_display_name(conn, display_name)? {
        if existing.id != user_id {
            return Err(Error::DisplayNameTaken(display_name.to_string()));
        }
    }
    let n = conn
        .execute(
            "UPDATE users SET display_name = ?1 WHERE id = ?2",
            params![display_name, user_id],
        )
        .map_err(storage_err)?;
    if n == 0 {
        return Err(Error::NotFound(Resource::User));
    }
    read_user(conn, user_id)?.ok_or(Error::NotFound(Resource::User))
}

/// Unconditional balance write. The caller must already hold the
/// serializable transaction.
pub fn update_user_balance(
    conn: &Connection,
    user_id: &str,
    balance: &Amount,
    locked: &Amount,
) -> Result<()> {
    if locked > balance {
        return Err(Error::Internal(format!(
            "Balance invariant violated for {}: locked {} > balance {}",
            user_id, locked, balance
        )));
    }
    let n = conn
        .execute(
            "UPDATE users SET balance = ?1, locked_balance = ?2 WHERE id = ?3",
            params![balance.to_string(), locked.to_string(), user_id],
        )
        .map_err(storage_err)?;
    if n == 0 {
        return Err(Error::NotFound(Resource::User));
    }
    Ok(())
}

/// Conditional balance write: succeeds only when the stored pair still
/// matches `expected`.
pub fn compare_and_update_user(
    conn: &Connection,
    user_id: &str,
    expected: &BalanceSnapshot,
    new: &BalanceSnapshot,
) -> Result<User> {
    if new.locked > new.balance {
        return Err(Error::Internal(format!(
            "Balance invariant violated for {}: locked {} > balance {}",
            user_id, new.locked, new.balance
        )));
    }
    let n = conn
        .execute(
            "UPDATE users SET balance = ?1, locked_balance = ?2
             WHERE id = ?3 AND balance = ?4 AND locked_balance = ?5",
            params![
                new.balance.to_string(),
                new.locked.to_string(),
                user_id,
                expected.balance.to_string(),
                expected.locked.to_string(),
            ],
        )
        .map_err(storage_err)?;
    if n == 0 {
        return match read_user(conn, user_id)? {
            Some(_) => Err(Error::ConcurrencyConflict),
            None => Err(Error::NotFound(Resource::User)),
        };
    }
    read_user(conn, user_id)?.ok_or(Error::NotFound(Resource::User))
}

// CRUD functions for LedgerEntry

pub fn insert_ledger_entry(conn: &Connection, entry: &NewLedgerEntry) -> Result<LedgerEntry> {
    if entry.amount.is_zero() {
        return Err(Error::Internal(format!(
            "Ledger amounts must be positive: {} for {}",
            entry.kind.as_str(),
            entry.user_id
        )));
    }
    conn.execute(
        "INSERT INTO ledger_entries
         (user_id, kind, amount, balance_after, session_id, description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.user_id,
            entry.kind.as_str(),
            entry.amount.to_string(),
            entry.balance_after.to_string(),
            entry.session_id,
            entry.description,
            entry.created_at,
        ],
    )
    .map_err(storage_err)?;
    let id = conn.last_insert_rowid();
    Ok(LedgerEntry {
        id: id.to_string(),
        user_id: entry.user_id.clone(),
        kind: entry.kind,
        amount: entry.amount.clone(),
        balance_after: entry.balance_after.clone(),
        session_id: entry.session_id.clone(),
        description: entry.description.clone(),
        created_at: entry.created_at,
    })
}

fn row_to_ledger_entry(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<(LedgerEntry, String, String, String)> {
    let id: i64 = row.get(0)?;
    let kind: String = row.get(2)?;
    let amount: String = row.get(3)?;
    let balance_after: String = row.get(4)?;
    let entry = LedgerEntry {
        id: id.to_string(),
        user_id: row.get(1)?,
        kind: EntryKind::Lock,
        amount: Amount::zero(),
        balance_after: Amount::zero(),
        session_id: row.get(5)?,
        description: row.get(6)?,
        created_at: row.get(7)?,
    };
    Ok((entry, kind, amount, balance_after))
}

fn finish_ledger_entry(raw: (LedgerEntry, String, String, String)) -> Result<LedgerEntry> {
    let (mut entry, kind, amount, balance_after) = raw;
    entry.kind = EntryKind::parse(&kind)?;
    entry.amount = parse_amount(&amount)?;
    entry.balance_after = parse_amount(&balance_after)?;
    Ok(entry)
}

const LEDGER_COLUMNS: &str =
    "id, user_id, kind, amount, balance_after, session_id, description, created_at";

pub fn ledger_history(
    conn: &Connection,
    user_id: &str,
    limit: u64,
    offset: u64,
) -> Result<(Vec<LedgerEntry>, u64)> {
    let total: u64 = conn
        .query_row(
            "SELECT COUNT(*) FROM ledger_entries WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(storage_err)?;

    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM ledger_entries WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            LEDGER_COLUMNS
        ))
        .map_err(storage_err)?;
    let iter = stmt
        .query_map(params![user_id, limit, offset], row_to_ledger_entry)
        .map_err(storage_err)?;

    let mut entries = Vec::new();
    for raw in iter {
        entries.push(finish_ledger_entry(raw.map_err(storage_err)?)?);
    }
    Ok((entries, total))
}

pub fn ledger_by_session(conn: &Connection, session_id: &str) -> Result<Vec<LedgerEntry>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM ledger_entries WHERE session_id = ?1
             ORDER BY created_at ASC, id ASC",
            LEDGER_COLUMNS
        ))
        .map_err(storage_err)?;
    let iter = stmt
        .query_map(params![session_id], row_to_ledger_entry)
        .map_err(storage_err)?;

    let mut entries = Vec::new();
    for raw in iter {
        entries.push(finish_ledger_entry(raw.map_err(storage_err)?)?);
    }
    Ok(entries)
}

// CRUD functions for Game and Contract

pub fn create_game(conn: &Connection, game: &Game) -> Result<()> {
    conn.execute(
        "INSERT INTO games (id, name, client_secret_digest, callback_url, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            game.id,
            game.name,
            game.client_secret_digest,
            game.callback_url,
            game.is_active,
            game.created_at,
        ],
    )
    .map_err(storage_err)?;
    Ok(())
}

pub fn read_game(conn: &Connection, game_id: &str) -> Result<Option<Game>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, client_secret_digest, callback_url, is_active, created_at
             FROM games WHERE id = ?1",
        )
        .map_err(storage_err)?;
    stmt.query_row(params![game_id], |row| {
        Ok(Game {
            id: row.get(0)?,
            name: row.get(1)?,
            client_secret_digest: row.get(2)?,
            callback_url: row.get(3)?,
            is_active: row.get(4)?,
            created_at: row.get(5)?,
        })
    })
    .optional()
    .map_err(storage_err)
}

pub fn create_contract(conn: &Connection, contract: &Contract) -> Result<()> {
    conn.execute(
        "INSERT INTO contracts
         (id, game_id, name, entry_fee, platform_fee_bps, min_players, max_players,
          ttl_seconds, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            contract.id,
            contract.game_id,
            contract.name,
            contract.entry_fee.to_string(),
            contract.platform_fee_bps,
            contract.min_players,
            contract.max_players,
            contract.ttl_seconds,
            contract.is_active,
            contract.created_at,
        ],
    )
    .map_err(storage_err)?;
    Ok(())
}

fn row_to_contract(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Contract, String)> {
    let entry_fee: String = row.get(3)?;
    let contract = Contract {
        id: row.get(0)?,
        game_id: row.get(1)?,
        name: row.get(2)?,
        entry_fee: Amount::zero(),
        platform_fee_bps: row.get(4)?,
        min_players: row.get(5)?,
        max_players: row.get(6)?,
        ttl_seconds: row.get(7)?,
        is_active: row.get(8)?,
        created_at: row.get(9)?,
    };
    Ok((contract, entry_fee))
}

const CONTRACT_COLUMNS: &str = "id, game_id, name, entry_fee, platform_fee_bps, min_players, \
                                max_players, ttl_seconds, is_active, created_at";

pub fn read_contract(conn: &Connection, contract_id: &str) -> Result<Option<Contract>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM contracts WHERE id = ?1",
            CONTRACT_COLUMNS
        ))
        .map_err(storage_err)?;
    let raw = stmt
        .query_row(params![contract_id], row_to_contract)
        .optional()
        .map_err(storage_err)?;
    match raw {
        Some((mut contract, entry_fee)) => {
            contract.entry_fee = parse_amount(&entry_fee)?;
            Ok(Some(contract))
        }
        None => Ok(None),
    }
}

pub fn list_contracts(conn: &Connection) -> Result<Vec<Contract>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM contracts ORDER BY created_at ASC",
            CONTRACT_COLUMNS
        ))
        .map_err(storage_err)?;
    let iter = stmt.query_map([], row_to_contract).map_err(storage_err)?;

    let mut contracts = Vec::new();
    for raw in iter {
        let (mut contract, entry_fee) = raw.map_err(storage_err)?;
        contract.entry_fee = parse_amount(&entry_fee)?;
        contracts.push(contract);
    }
    Ok(contracts)
}

// CRUD functions for GameSession

pub fn insert_session(conn: &Connection, session: &GameSession) -> Result<()> {
    conn.execute(
        "INSERT INTO game_sessions
         (id, contract_id, status, total_pot, created_at, expires_at, settled_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            session.id,
            session.contract_id,
            session.status.as_str(),
            session.total_pot.to_string(),
            session.created_at,
            session.expires_at,
            session.settled_at,
        ],
    )
    .map_err(storage_err)?;

    for player in &session.players {
        conn.execute(
            "INSERT INTO session_players
             (session_id, user_id, amount_locked, is_winner, win_amount)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                player.user_id,
                player.amount_locked.to_string(),
                player.is_winner,
                player.win_amount.to_string(),
            ],
        )
        .map_err(storage_err)?;
    }
    Ok(())
}

fn read_session_players(conn: &Connection, session_id: &str) -> Result<Vec<SessionPlayer>> {
    let mut stmt = conn
        .prepare(
            "SELECT user_id, amount_locked, is_winner, win_amount
             FROM session_players WHERE session_id = ?1 ORDER BY rowid ASC",
        )
        .map_err(storage_err)?;
    let iter = stmt
        .query_map(params![session_id], |row| {
            let amount_locked: String = row.get(1)?;
            let win_amount: String = row.get(3)?;
            Ok((
                SessionPlayer {
                    user_id: row.get(0)?,
                    amount_locked: Amount::zero(),
                    is_winner: row.get(2)?,
                    win_amount: Amount::zero(),
                },
                amount_locked,
                win_amount,
            ))
        })
        .map_err(storage_err)?;

    let mut players = Vec::new();
    for raw in iter {
        let (mut player, amount_locked, win_amount) = raw.map_err(storage_err)?;
        player.amount_locked = parse_amount(&amount_locked)?;
        player.win_amount = parse_amount(&win_amount)?;
        players.push(player);
    }
    Ok(players)
}

pub fn read_session(conn: &Connection, session_id: &str) -> Result<Option<GameSession>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, contract_id, status, total_pot, created_at, expires_at, settled_at
             FROM game_sessions WHERE id = ?1",
        )
        .map_err(storage_err)?;
    let raw = stmt
        .query_row(params![session_id], |row| {
            let status: String = row.get(2)?;
            let total_pot: String = row.get(3)?;
            Ok((
                GameSession {
                    id: row.get(0)?,
                    contract_id: row.get(1)?,
                    status: SessionStatus::Pending,
                    total_pot: Amount::zero(),
                    created_at: row.get(4)?,
                    expires_at: row.get(5)?,
                    settled_at: row.get(6)?,
                    players: Vec::new(),
                },
                status,
                total_pot,
            ))
        })
        .optional()
        .map_err(storage_err)?;

    match raw {
        Some((mut session, status, total_pot)) => {
            session.status = SessionStatus::parse(&status)?;
            session.total_pot = parse_amount(&total_pot)?;
            session.players = read_session_players(conn, session_id)?;
            Ok(Some(session))
        }
        None => Ok(None),
    }
}

pub fn update_session(conn: &Connection, session: &GameSession) -> Result<()> {
    let n = conn
        .execute(
            "UPDATE game_sessions SET status = ?1, settled_at = ?2 WHERE id = ?3",
            params![session.status.as_str(), session.settled_at, session.id],
        )
        .map_err(storage_err)?;
    if n == 0 {
        return Err(Error::NotFound(Resource::Session));
    }

    for player in &session.players {
        conn.execute(
            "UPDATE session_players SET is_winner = ?1, win_amount = ?2
             WHERE session_id = ?3 AND user_id = ?4",
            params![
                player.is_winner,
                player.win_amount.to_string(),
                session.id,
                player.user_id,
            ],
        )
        .map_err(storage_err)?;
    }
    Ok(())
}

pub fn find_expired_sessions(conn: &Connection, now: u64) -> Result<Vec<GameSession>> {
    let mut stmt = conn
        .prepare(
            "SELECT id FROM game_sessions
             WHERE status IN ('PENDING', 'ACTIVE') AND expires_at < ?1
             ORDER BY expires_at ASC",
        )
        .map_err(storage_err)?;
    let iter = stmt
        .query_map(params![now], |row| row.get::<_, String>(0))
        .map_err(storage_err)?;

    let mut sessions = Vec::new();
    for session_id in iter {
        let session_id = session_id.map_err(storage_err)?;
        if let Some(session) = read_session(conn, &session_id)? {
            sessions.push(session);
        }
    }
    Ok(sessions)
}

pub fn has_open_session(conn: &Connection, contract_id: &str, user_id: &str) -> Result<bool> {
    let count: u64 = conn
        .query_row(
            "SELECT COUNT(*) FROM game_sessions s
             JOIN session_players p ON p.session_id = s.id
             WHERE s.contract_id = ?1 AND p.user_id = ?2
               AND s.status IN ('PENDING', 'ACTIVE')",
            params![contract_id, user_id],
            |row| row.get(0),
        )
        .map_err(storage_err)?;
    Ok(count > 0)
}

// CRUD functions for Lobby

fn players_to_json(players: &[LobbyPlayer]) -> Result<String> {
    serde_json::to_string(players).map_err(|e| Error::Storage(e.to_string()))
}

fn players_from_json(raw: &str) -> Result<Vec<LobbyPlayer>> {
    serde_json::from_str(raw).map_err(|e| Error::Storage(e.to_string()))
}

pub fn insert_lobby(conn: &Connection, lobby: &Lobby) -> Result<()> {
    conn.execute(
        "INSERT INTO lobbies (id, contract_id, status, created_at, session_id, players)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            lobby.id,
            lobby.contract_id,
            lobby.status.as_str(),
            lobby.created_at,
            lobby.session_id,
            players_to_json(&lobby.players)?,
        ],
    )
    .map_err(storage_err)?;
    Ok(())
}

pub fn update_lobby(conn: &Connection, lobby: &Lobby) -> Result<()> {
    let n = conn
        .execute(
            "UPDATE lobbies SET status = ?1, session_id = ?2, players = ?3 WHERE id = ?4",
            params![
                lobby.status.as_str(),
                lobby.session_id,
                players_to_json(&lobby.players)?,
                lobby.id,
            ],
        )
        .map_err(storage_err)?;
    if n == 0 {
        return Err(Error::NotFound(Resource::Lobby));
    }
    Ok(())
}

fn row_to_lobby(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Lobby, String, String)> {
    let status: String = row.get(2)?;
    let players: String = row.get(5)?;
    let lobby = Lobby {
        id: row.get(0)?,
        contract_id: row.get(1)?,
        status: LobbyStatus::Waiting,
        created_at: row.get(3)?,
        session_id: row.get(4)?,
        players: Vec::new(),
    };
    Ok((lobby, status, players))
}

fn finish_lobby(raw: (Lobby, String, String)) -> Result<Lobby> {
    let (mut lobby, status, players) = raw;
    lobby.status = LobbyStatus::parse(&status)?;
    lobby.players = players_from_json(&players)?;
    Ok(lobby)
}

const LOBBY_COLUMNS: &str = "id, contract_id, status, created_at, session_id, players";

pub fn read_lobby(conn: &Connection, lobby_id: &str) -> Result<Option<Lobby>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM lobbies WHERE id = ?1",
            LOBBY_COLUMNS
        ))
        .map_err(storage_err)?;
    let raw = stmt
        .query_row(params![lobby_id], row_to_lobby)
        .optional()
        .map_err(storage_err)?;
    raw.map(finish_lobby).transpose()
}

pub fn list_lobbies(conn: &Connection, contract_id: Option<&str>) -> Result<Vec<Lobby>> {
    let mut lobbies = Vec::new();
    match contract_id {
        Some(contract_id) => {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM lobbies WHERE contract_id = ?1 ORDER BY created_at ASC",
                    LOBBY_COLUMNS
                ))
                .map_err(storage_err)?;
            let iter = stmt
                .query_map(params![contract_id], row_to_lobby)
                .map_err(storage_err)?;
            for raw in iter {
                lobbies.push(finish_lobby(raw.map_err(storage_err)?)?);
            }
        }
        None => {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM lobbies ORDER BY created_at ASC",
                    LOBBY_COLUMNS
                ))
                .map_err(storage_err)?;
            let iter = stmt.query_map([], row_to_lobby).map_err(storage_err)?;
            for raw in iter {
                lobbies.push(finish_lobby(raw.map_err(storage_err)?)?);
            }
        }
    }
    Ok(lobbies)
}

pub fn find_waiting_lobby(conn: &Connection, contract_id: &str) -> Result<Option<Lobby>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM lobbies WHERE contract_id = ?1 AND status = 'WAITING'
             ORDER BY created_at ASC LIMIT 1",
            LOBBY_COLUMNS
        ))
        .map_err(storage_err)?;
    let raw = stmt
        .query_row(params![contract_id], row_to_lobby)
        .optional()
        .map_err(storage_err)?;
    raw.map(finish_lobby).transpose()
}

/// Membership lives in the JSON column, so open lobbies are scanned in
/// process. Open lobbies are few at any time.
pub fn find_open_lobby_for_user(conn: &Connection, user_id: &str) -> Result<Option<Lobby>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM lobbies WHERE status != 'CLOSED' ORDER BY created_at ASC",
            LOBBY_COLUMNS
        ))
        .map_err(storage_err)?;
    let iter = stmt.query_map([], row_to_lobby).map_err(storage_err)?;
    for raw in iter {
        let lobby = finish_lobby(raw.map_err(storage_err)?)?;
        if lobby.contains(user_id) {
            return Ok(Some(lobby));
        }
    }
    Ok(None)
}

pub fn find_lobby_by_session(conn: &Connection, session_id: &str) -> Result<Option<Lobby>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM lobbies WHERE session_id = ?1",
            LOBBY_COLUMNS
        ))
        .map_err(storage_err)?;
    let raw = stmt
        .query_row(params![session_id], row_to_lobby)
        .optional()
        .map_err(storage_err)?;
    raw.map(finish_lobby).transpose()
}
