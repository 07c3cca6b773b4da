//! Subcommand handlers
//!
//! Exit codes: 0 success, 1 lock not acquired, 2 error, 130 interrupted.
//! `run` exits with the child's status once the lock is released.

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use kvlock_core::{LockError, LockManager, RedisStore};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AcquireArgs, Command, Configuration, ReleaseArgs, RunArgs};

pub const EXIT_NOT_ACQUIRED: u8 = 1;
pub const EXIT_ERROR: u8 = 2;
pub const EXIT_INTERRUPTED: u8 = 130;

/// Result of `kvlock acquire --json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcquireOutcome {
    pub acquired: bool,
    pub lock_key: String,
    pub owner_token: String,
    pub ttl_ms: u64,
}

pub async fn execute(command: Command, configuration: &Configuration) -> anyhow::Result<ExitCode> {
    let store_url = configuration.store_url();
    let store = RedisStore::connect(&store_url)
        .await
        .context("Failed to connect to store")?;
    let manager = LockManager::with_options(Arc::new(store), configuration.lock_options())?;

    let code = match command {
        Command::Acquire(args) => acquire(&manager, configuration, args, interrupt_signal()?).await?,
        Command::Release(args) => release(&manager, args).await?,
        Command::Run(args) => run(&manager, configuration, args, interrupt_signal()?).await?,
    };

    Ok(ExitCode::from(code))
}

async fn acquire<C>(
    manager: &LockManager,
    configuration: &Configuration,
    args: AcquireArgs,
    interrupt: C,
) -> anyhow::Result<u8>
where
    C: Future<Output = ()>,
{
    let owner_token = args.token.unwrap_or_else(LockManager::new_owner_token);
    let ttl_ms = args.ttl_ms.unwrap_or_else(|| configuration.default_ttl_ms());
    let wait_ms = args.wait_ms.unwrap_or_else(|| configuration.default_wait_ms());

    let acquired = match manager
        .acquire_with_cancel(&args.key, &owner_token, ttl_ms, wait_ms, interrupt)
        .await
    {
        Ok(acquired) => acquired,
        Err(LockError::Interrupted) => return Ok(EXIT_INTERRUPTED),
        Err(e) => return Err(e.into()),
    };

    let outcome = AcquireOutcome {
        acquired,
        lock_key: args.key,
        owner_token,
        ttl_ms,
    };

    if args.json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else if outcome.acquired {
        println!("{}", outcome.owner_token);
    }

    Ok(acquire_exit_code(outcome.acquired))
}

async fn release(manager: &LockManager, args: ReleaseArgs) -> anyhow::Result<u8> {
    manager.release(&args.key, &args.token).await?;
    Ok(0)
}

/// Acquire, run the child, then release on every path out of the child:
/// normal exit, spawn failure or interrupt.
async fn run<C>(
    manager: &LockManager,
    configuration: &Configuration,
    args: RunArgs,
    interrupt: C,
) -> anyhow::Result<u8>
where
    C: Future<Output = ()>,
{
    let Some((program, program_args)) = args.command.split_first() else {
        anyhow::bail!("no command given");
    };

    let owner_token = LockManager::new_owner_token();
    let ttl_ms = args.ttl_ms.unwrap_or_else(|| configuration.default_ttl_ms());
    let wait_ms = args.wait_ms.unwrap_or_else(|| configuration.default_wait_ms());

    tokio::pin!(interrupt);

    match manager
        .acquire_with_cancel(&args.key, &owner_token, ttl_ms, wait_ms, &mut interrupt)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            warn!(key = %args.key, wait_ms, "Lock not acquired, command not run");
            return Ok(EXIT_NOT_ACQUIRED);
        }
        Err(LockError::Interrupted) => return Ok(EXIT_INTERRUPTED),
        Err(e) => return Err(e.into()),
    }

    info!(key = %args.key, program = %program, "Running command under lock");
    let outcome = match tokio::process::Command::new(program)
        .args(program_args)
        .spawn()
    {
        Ok(mut child) => {
            let status = tokio::select! {
                status = child.wait() => Some(status),
                _ = &mut interrupt => None,
            };
            match status {
                Some(status) => status.map(|status| child_exit_code(status.code())),
                None => {
                    info!(key = %args.key, "Interrupted, stopping command");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to stop command");
                    }
                    Ok(EXIT_INTERRUPTED)
                }
            }
        }
        Err(e) => Err(e),
    };

    // Release before reporting a spawn failure so the lock is not held until TTL
    if let Err(e) = manager.release(&args.key, &owner_token).await {
        warn!(key = %args.key, error = %e, "Lock left to expire after failed release");
    }

    outcome.with_context(|| format!("Failed to run {}", program))
}

fn acquire_exit_code(acquired: bool) -> u8 {
    if acquired { 0 } else { EXIT_NOT_ACQUIRED }
}

/// Map a child's exit status; killed by a signal or out of range maps to 1
fn child_exit_code(code: Option<i32>) -> u8 {
    code.and_then(|c| u8::try_from(c).ok()).unwrap_or(1)
}

/// Completes on Ctrl+C. The handler is registered before this returns, not on
/// first poll, so the signal is caught even if acquisition never waits.
#[cfg(unix)]
fn interrupt_signal() -> anyhow::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install Ctrl+C handler")?;
    Ok(async move {
        let _ = sigint.recv().await;
    })
}

#[cfg(windows)]
fn interrupt_signal() -> anyhow::Result<impl Future<Output = ()>> {
    let mut ctrl_c =
        tokio::signal::windows::ctrl_c().context("Failed to install Ctrl+C handler")?;
    Ok(async move {
        let _ = ctrl_c.recv().await;
    })
}
