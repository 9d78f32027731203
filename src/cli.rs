//! Operator and buyer commands: purchases, settlement inspection, balances
//! and plain USDC transfers.

use alloy::primitives::{Address, U256};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use std::io::Write;
use std::sync::Arc;
use tracing::info;

use crate::cctp::{CctpPayer, receive_message};
use crate::chain::Chain;
use crate::config::{Ctx, Env};
use crate::evm::{RawPrivateKeyWallet, ReadOnlyEvm, usdc_balance, usdc_decimals};
use crate::settlement::{self, Payer, Settlement, SettlementState, Settler};
use crate::usdc::Usdc;
use crate::{build_finalizer, build_relayer, build_settler};

const DEFAULT_LIST_LIMIT: u32 = 20;

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Buy a listing with the buyer key from the secrets file
    ///
    /// Pays from `--chain`. A different chain than the configured
    /// destination settles through a CCTP burn with hook.
    Buy {
        #[arg(short = 'l', long = "listing-id")]
        listing_id: i64,
        #[arg(short = 'c', long = "chain")]
        chain: Chain,
    },

    /// Inspect or resume settlements
    Settlement {
        #[command(subcommand)]
        action: SettlementCommand,
    },

    /// Show the USDC balance of an address (defaults to the buyer wallet)
    Balance {
        #[arg(short = 'c', long = "chain")]
        chain: Chain,
        #[arg(short = 'a', long = "address")]
        address: Option<Address>,
    },

    /// Send USDC from the buyer wallet on one chain
    Transfer {
        #[arg(short = 'c', long = "chain")]
        chain: Chain,
        #[arg(short = 't', long = "to")]
        to: Address,
        #[arg(short = 'a', long = "amount")]
        amount: Usdc,
    },

    /// Bridge USDC with CCTP and mint it on the destination yourself
    ///
    /// Burns on `--from`, waits for Circle's attestation and submits
    /// `receiveMessage` on `--to` with the buyer key. No relayer involved.
    Bridge {
        #[arg(long = "from")]
        from: Chain,
        #[arg(long = "to")]
        to: Chain,
        /// Mint recipient (defaults to the buyer wallet)
        #[arg(short = 'r', long = "recipient")]
        recipient: Option<Address>,
        #[arg(short = 'a', long = "amount")]
        amount: Usdc,
    },
}

#[derive(Debug, Subcommand)]
pub enum SettlementCommand {
    /// Print one settlement
    Show { id: String },
    /// Most recently updated settlements
    List {
        #[arg(short = 'n', long = "limit", default_value_t = DEFAULT_LIST_LIMIT)]
        limit: u32,
    },
    /// Drive a settlement to completion from its current state
    Resume { id: String },
}

#[derive(Debug, Parser)]
#[command(name = "cartfree-cli")]
#[command(about = "Buyer and operator tooling for Cartfree settlements")]
#[command(version)]
pub struct CliEnv {
    #[clap(flatten)]
    env: Env,
    #[command(subcommand)]
    pub command: Commands,
}

impl CliEnv {
    pub fn parse_and_convert() -> anyhow::Result<(Ctx, Commands)> {
        let cli = Self::parse();
        let ctx = Ctx::load_files(&cli.env.config, &cli.env.secrets)?;
        Ok((ctx, cli.command))
    }
}

pub async fn run_command(ctx: Ctx, command: Commands) -> anyhow::Result<()> {
    let pool = ctx.get_sqlite_pool().await?;
    sqlx::migrate!().run(&pool).await?;
    run_command_with_writer(&ctx, command, &pool, &mut std::io::stdout()).await
}

async fn run_command_with_writer<W: Write>(
    ctx: &Ctx,
    command: Commands,
    pool: &SqlitePool,
    stdout: &mut W,
) -> anyhow::Result<()> {
    match command {
        Commands::Buy { listing_id, chain } => buy(ctx, pool, listing_id, chain, stdout).await?,
        Commands::Settlement { action } => settlement_command(ctx, pool, action, stdout).await?,
        Commands::Balance { chain, address } => balance(ctx, chain, address, stdout).await?,
        Commands::Transfer { chain, to, amount } => {
            let payer = buyer_payer(ctx, chain)?;
            let tx = payer.transfer(to, amount.to_u256_6_decimals()?).await?;
            writeln!(stdout, "Sent {amount} USDC to {to} on {chain}: {tx}")?;
        }
        Commands::Bridge {
            from,
            to,
            recipient,
            amount,
        } => bridge(ctx, from, to, recipient, amount, stdout).await?,
    }

    info!("CLI operation completed successfully");
    Ok(())
}

fn buyer_payer(ctx: &Ctx, chain: Chain) -> anyhow::Result<CctpPayer<RawPrivateKeyWallet>> {
    let signer = ctx.buyer_signer()?;
    let chain_ctx = ctx.chain(chain)?;
    let wallet = RawPrivateKeyWallet::connect(
        chain_ctx.rpc_url.clone(),
        signer.clone(),
        ctx.required_confirmations,
    );

    Ok(CctpPayer::new(chain, wallet, chain_ctx.contracts))
}

fn settler(ctx: &Ctx, pool: &SqlitePool) -> anyhow::Result<Settler> {
    let relayer = build_relayer(ctx, pool)?.map(Arc::new);
    let finalizer = build_finalizer(ctx, relayer.as_ref())?.ok_or_else(|| {
        anyhow::anyhow!("configure relayer_url or relayer_private_key to finalize transfers")
    })?;

    build_settler(ctx, pool, finalizer)
}

async fn buy<W: Write>(
    ctx: &Ctx,
    pool: &SqlitePool,
    listing_id: i64,
    chain: Chain,
    stdout: &mut W,
) -> anyhow::Result<()> {
    let payer = buyer_payer(ctx, chain)?;
    let settler = settler(ctx, pool)?;

    let started = settler.start(listing_id, &payer).await?;
    writeln!(
        stdout,
        "Settlement {} started: {} USDC from {} to {}",
        started.id, started.price, started.source_chain, started.destination_chain
    )?;

    let done = settler.drive(&started.id, Some(&payer)).await?;
    write_settlement(stdout, &done)?;
    Ok(())
}

async fn settlement_command<W: Write>(
    ctx: &Ctx,
    pool: &SqlitePool,
    action: SettlementCommand,
    stdout: &mut W,
) -> anyhow::Result<()> {
    match action {
        SettlementCommand::Show { id } => {
            let found = settlement::load(pool, &id).await?;
            write_settlement(stdout, &found)?;
        }
        SettlementCommand::List { limit } => {
            let settlements = settlement::list(pool, limit).await?;
            if settlements.is_empty() {
                writeln!(stdout, "No settlements")?;
            }
            for s in &settlements {
                writeln!(
                    stdout,
                    "{}  {:<11}  listing {:<5}  {} USDC  {} -> {}",
                    s.id, s.state, s.listing_id, s.price, s.source_chain, s.destination_chain
                )?;
            }
        }
        SettlementCommand::Resume { id } => {
            let existing = settlement::load(pool, &id).await?;
            let settler = settler(ctx, pool)?;

            let done = if existing.state == SettlementState::Pending {
                let payer = buyer_payer(ctx, existing.source_chain)?;
                settler.drive(&id, Some(&payer as &dyn Payer)).await?
            } else {
                settler.drive(&id, None).await?
            };

            write_settlement(stdout, &done)?;
        }
    }

    Ok(())
}

fn write_settlement<W: Write>(stdout: &mut W, s: &Settlement) -> std::io::Result<()> {
    writeln!(stdout, "Settlement {}", s.id)?;
    writeln!(stdout, "  state:       {}", s.state)?;
    writeln!(stdout, "  listing:     {}", s.listing_id)?;
    writeln!(stdout, "  price:       {} USDC", s.price)?;
    writeln!(stdout, "  route:       {} -> {}", s.source_chain, s.destination_chain)?;
    writeln!(stdout, "  buyer:       {}", s.buyer)?;
    writeln!(stdout, "  seller:      {}", s.seller)?;

    let txs = [
        ("transfer tx", s.transfer_tx),
        ("burn tx", s.burn_tx),
        ("receive tx", s.receive_tx),
        ("execute tx", s.execute_tx),
    ];
    for (label, tx) in txs
        .into_iter()
        .filter_map(|(label, tx)| tx.map(|tx| (label, tx)))
    {
        writeln!(stdout, "  {label:<12} {tx}")?;
    }

    if let Some(transaction_id) = s.transaction_id {
        writeln!(stdout, "  transaction: {transaction_id}")?;
    }

    if s.attempts > 0 {
        writeln!(stdout, "  attempts:    {}", s.attempts)?;
    }

    if let Some(err) = &s.last_error {
        writeln!(stdout, "  last error:  {err}")?;
    }

    Ok(())
}

async fn balance<W: Write>(
    ctx: &Ctx,
    chain: Chain,
    address: Option<Address>,
    stdout: &mut W,
) -> anyhow::Result<()> {
    let owner = match address {
        Some(address) => address,
        None => ctx.buyer_signer()?.address(),
    };
    let chain_ctx = ctx.chain(chain)?;
    let evm = ReadOnlyEvm::connect(chain_ctx.rpc_url.clone());
    let usdc = chain_ctx.contracts.usdc;

    let decimals = usdc_decimals(&evm, usdc).await?;
    if decimals != 6 {
        anyhow::bail!("USDC at {usdc} on {chain} reports {decimals} decimals, expected 6");
    }

    let raw = usdc_balance(&evm, usdc, owner).await?;
    writeln!(
        stdout,
        "{owner} holds {} USDC on {chain}",
        Usdc::from_u256_6_decimals(raw)?
    )?;
    Ok(())
}

async fn bridge<W: Write>(
    ctx: &Ctx,
    from: Chain,
    to: Chain,
    recipient: Option<Address>,
    amount: Usdc,
    stdout: &mut W,
) -> anyhow::Result<()> {
    if from == to {
        anyhow::bail!("source and destination chain are both {from}");
    }

    let payer = buyer_payer(ctx, from)?;
    let destination = ctx.chain(to)?;
    let minter = RawPrivateKeyWallet::connect(
        destination.rpc_url.clone(),
        ctx.buyer_signer()?.clone(),
        ctx.required_confirmations,
    );
    let recipient = recipient.unwrap_or_else(|| payer.address());
    let amount_base: U256 = amount.to_u256_6_decimals()?;
    let circle = ctx.circle_client()?;

    let max_fee = circle.max_fee(amount_base, from, to).await;
    payer.ensure_usdc_approval(amount_base).await?;
    let burn_tx = payer
        .deposit_for_burn(amount_base, to, recipient, max_fee)
        .await?;
    writeln!(stdout, "Burned {amount} USDC on {from}: {burn_tx}")?;

    let attestation = circle.poll_attestation(from, burn_tx).await?;
    writeln!(stdout, "Attestation received, nonce {}", attestation.nonce)?;

    let receipt = receive_message(
        &minter,
        destination.contracts.message_transmitter,
        attestation.message,
        attestation.attestation,
    )
    .await?;
    writeln!(
        stdout,
        "Minted to {recipient} on {to}: {}",
        receipt.transaction_hash
    )?;

    Ok(())
}
