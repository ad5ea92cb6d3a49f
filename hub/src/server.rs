use std::net::SocketAddr;
use std::sync::Arc;

use hyper::Method;
use jsonrpsee::core::error::Error as RpcError;
use jsonrpsee::server::{AllowHosts, ServerBuilder, ServerHandle};
use jsonrpsee::types::error::{CallError, ErrorObject};
use jsonrpsee::{types::Params, PendingSubscriptionSink, RpcModule, SubscriptionMessage};
use pluto_core::error::Error;
use pluto_core::storage::{LedgerStoreT, LobbyStoreT, UserStoreT};
use pluto_core::types::{
    BalanceResponse, CancelParams, CancelResponse, DepositParams, ExecuteParams,
    ExecuteResponse, HistoryPage, JoinLobbyParams, JoinLobbyResponse, LeaveLobbyResponse,
    LobbyDetail, LobbySummary, SetDisplayNameParams, SettleParams, SettleResponse, User,
};
use serde::de::DeserializeOwned;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::context::ApplicationContext;

const DEFAULT_HISTORY_LIMIT: u64 = 50;
const MAX_HISTORY_LIMIT: u64 = 100;

type RpcResult<T> = std::result::Result<T, RpcError>;

/// Map a hub error onto the wire envelope: stable code, HTTP-equivalent
/// status, opaque message for infrastructure failures.
fn rpc_error(e: Error) -> RpcError {
    let message = match &e {
        Error::Storage(_) | Error::Internal(_) => {
            warn!("Internal error: {}", e);
            "Internal error".to_string()
        }
        other => other.to_string(),
    };
    let data = serde_json::json!({ "code": e.code(), "status": e.status() });
    RpcError::Call(CallError::Custom(ErrorObject::owned(
        e.status() as i32,
        message,
        Some(data),
    )))
}

fn invalid_params<E: Into<anyhow::Error>>(e: E) -> RpcError {
    RpcError::Call(CallError::InvalidParams(e.into()))
}

/// Game-backend calls carry `(gameId, body, signature)`; the MAC is
/// verified over the literal body string before it is deserialized.
async fn parse_game_params<T: DeserializeOwned>(
    params: Params<'_>,
    context: &ApplicationContext,
) -> RpcResult<T> {
    let (game_id, body, signature) = params.parse::<(String, String, String)>()?;
    context
        .authenticate_game(&game_id, body.as_bytes(), &signature)
        .await
        .map_err(rpc_error)?;
    serde_json::from_str(&body).map_err(invalid_params)
}

async fn get_balance(
    params: Params<'_>,
    context: Arc<ApplicationContext>,
) -> RpcResult<BalanceResponse> {
    let token: String = params.one()?;
    let user = context.authenticate_player(&token).await.map_err(rpc_error)?;
    let available_balance = user.available_balance();
    Ok(BalanceResponse {
        balance: user.balance,
        locked_balance: user.locked_balance,
        available_balance,
    })
}

async fn get_history(
    params: Params<'_>,
    context: Arc<ApplicationContext>,
) -> RpcResult<HistoryPage> {
    let (token, limit, offset) = params.parse::<(String, Option<u64>, Option<u64>)>()?;
    let user = context.authenticate_player(&token).await.map_err(rpc_error)?;

    let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT);
    let offset = offset.unwrap_or(0);
    let (data, total) = context
        .storage
        .history(&user.id, limit, offset)
        .await
        .map_err(rpc_error)?;
    let has_more = offset + (data.len() as u64) < total;
    Ok(HistoryPage {
        data,
        total,
        limit,
        offset,
        has_more,
    })
}

async fn set_display_name(
    params: Params<'_>,
    context: Arc<ApplicationContext>,
) -> RpcResult<User> {
    let (token, arg) = params.parse::<(String, SetDisplayNameParams)>()?;
    let user = context.authenticate_player(&token).await.map_err(rpc_error)?;
    context
        .storage
        .update_display_name(&user.id, &arg.display_name)
        .await
        .map_err(rpc_error)
}

async fn execute(
    params: Params<'_>,
    context: Arc<ApplicationContext>,
) -> RpcResult<ExecuteResponse> {
    let arg: ExecuteParams = parse_game_params(params, &context).await?;
    info!("Execute contract {}", arg.contract_id);
    context.execute(arg).await.map_err(rpc_error)
}

async fn settle(
    params: Params<'_>,
    context: Arc<ApplicationContext>,
) -> RpcResult<SettleResponse> {
    let arg: SettleParams = parse_game_params(params, &context).await?;
    context.settle(arg).await.map_err(rpc_error)
}

async fn cancel(
    params: Params<'_>,
    context: Arc<ApplicationContext>,
) -> RpcResult<CancelResponse> {
    let arg: CancelParams = parse_game_params(params, &context).await?;
    context.cancel(arg).await.map_err(rpc_error)
}

/// Development credit endpoint; registered only in the local
/// environment.
async fn deposit(
    params: Params<'_>,
    context: Arc<ApplicationContext>,
) -> RpcResult<BalanceResponse> {
    let arg: DepositParams = params.one()?;
    let user = context.engine.deposit(arg).await.map_err(rpc_error)?;
    let available_balance = user.available_balance();
    Ok(BalanceResponse {
        balance: user.balance,
        locked_balance: user.locked_balance,
        available_balance,
    })
}

async fn join_lobby(
    params: Params<'_>,
    context: Arc<ApplicationContext>,
) -> RpcResult<JoinLobbyResponse> {
    let (token, arg) = params.parse::<(String, JoinLobbyParams)>()?;
    let user = context.authenticate_player(&token).await.map_err(rpc_error)?;
    context
        .lobby_manager
        .join(&user, &arg.contract_id)
        .await
        .map_err(rpc_error)
}

async fn leave_lobby(
    params: Params<'_>,
    context: Arc<ApplicationContext>,
) -> RpcResult<LeaveLobbyResponse> {
    let token: String = params.one()?;
    let user = context.authenticate_player(&token).await.map_err(rpc_error)?;
    context
        .lobby_manager
        .leave(&user.id)
        .await
        .map_err(rpc_error)
}

async fn list_lobbies(
    params: Params<'_>,
    context: Arc<ApplicationContext>,
) -> RpcResult<Vec<LobbySummary>> {
    let contract_id: Option<String> = params.one()?;
    context
        .lobby_manager
        .list(contract_id.as_deref())
        .await
        .map_err(rpc_error)
}

async fn get_lobby_status(
    params: Params<'_>,
    context: Arc<ApplicationContext>,
) -> RpcResult<LobbyDetail> {
    let lobby_id: String = params.one()?;
    context
        .lobby_manager
        .status(&lobby_id)
        .await
        .map_err(rpc_error)
}

/// Long-lived lobby event stream. Subscribers that fall behind the
/// channel capacity are evicted when the bridge yields a lag error;
/// recovery is a fresh subscription plus the status snapshot.
async fn subscribe_lobby_events(
    params: Params<'_>,
    pending: PendingSubscriptionSink,
    context: Arc<ApplicationContext>,
) {
    let lobby_id: String = match params.one() {
        Ok(id) => id,
        Err(e) => {
            pending
                .reject(ErrorObject::owned(400, e.to_string(), None::<()>))
                .await;
            return;
        }
    };

    match context.storage.find_lobby(&lobby_id).await {
        Ok(Some(_)) => (),
        Ok(None) => {
            pending
                .reject(ErrorObject::owned(404, "Lobby not found", None::<()>))
                .await;
            return;
        }
        Err(e) => {
            pending
                .reject(ErrorObject::owned(500, e.to_string(), None::<()>))
                .await;
            return;
        }
    }

    let sink = match pending.accept().await {
        Ok(sink) => sink,
        Err(_) => return,
    };

    info!("Subscribe lobby events: {:?}", lobby_id);
    let receiver = context.broadcaster.subscribe(&lobby_id).await;
    let mut rx = BroadcastStream::new(receiver);
    drop(context);

    loop {
        tokio::select! {
            _ = sink.closed() => {
                break;
            }
            item = rx.next() => {
                match item {
                    Some(Ok(frame)) => {
                        let msg = match SubscriptionMessage::from_json(&frame) {
                            Ok(msg) => msg,
                            Err(e) => {
                                warn!("Failed to encode lobby frame: {:?}", e);
                                break;
                            }
                        };
                        if sink.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Subscription error: {:?}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

pub async fn run_server(context: ApplicationContext) -> anyhow::Result<ServerHandle> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any)
        .allow_headers([hyper::header::CONTENT_TYPE]);
    let middleware = ServiceBuilder::new().layer(cors);

    let host = format!("{}:{}", context.config.host, context.config.port);
    let is_local = context.config.environment == "local";

    let server = ServerBuilder::default()
        .set_host_filtering(AllowHosts::Any)
        .set_middleware(middleware)
        .build(host.parse::<SocketAddr>()?)
        .await?;

    let mut module = RpcModule::new(context);
    module.register_async_method("get_balance", get_balance)?;
    module.register_async_method("get_history", get_history)?;
    module.register_async_method("set_display_name", set_display_name)?;
    module.register_async_method("execute", execute)?;
    module.register_async_method("settle", settle)?;
    module.register_async_method("cancel", cancel)?;
    module.register_async_method("join_lobby", join_lobby)?;
    module.register_async_method("leave_lobby", leave_lobby)?;
    module.register_async_method("list_lobbies", list_lobbies)?;
    module.register_async_method("get_lobby_status", get_lobby_status)?;
    module.register_subscription(
        "subscribe_lobby_events",
        "s_lobby_event",
        "unsubscribe_lobby_events",
        subscribe_lobby_events,
    )?;
    if is_local {
        module.register_async_method("deposit", deposit)?;
    }

    let handle = server.start(module)?;
    info!("Server started at {:?}", host);
    Ok(handle)
}
