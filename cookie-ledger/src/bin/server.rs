//! Ledger demo binary: one signed transfer, committed through the actor

use anyhow::{bail, Context};
use chrono::Utc;
use cookie_ledger::{
    actor::spawn_ledger_actor, metrics::Metrics, BlockSummary, Config, Directory, KeyHolder,
    Ledger, ParticipantDirectory, ParticipantFilter, ParticipantHandle, Transaction,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting MoCookie ledger"
    );

    // Participants and their keys
    let alice_keys = config.keys.key_holder()?;
    let bob_keys = KeyHolder::generate(config.keys.bits)?;

    let mut directory = Directory::new();
    directory.add(ParticipantHandle::create(alice_keys.public_key_base64()?, "alice")?)?;
    directory.add(ParticipantHandle::create(bob_keys.public_key_base64()?, "bob")?)?;
    let alice = lookup_one(&directory, "alice")?;
    let bob = lookup_one(&directory, "bob")?;
    alice.set_wallet(3);

    // Ledger behind its single-writer actor
    let metrics = Metrics::new()?;
    let (ledger, join) = spawn_ledger_actor(
        Ledger::new(),
        config.actor.mailbox_capacity,
        metrics.clone(),
    );

    let anchor = ledger.reference_hash().await?;
    let transfer =
        Transaction::transfer(anchor, alice.clone(), bob.clone(), "demo", 1, Utc::now())?;

    // Only admit what the giver actually signed
    let signature = alice_keys.sign(&transfer.render())?;
    if !alice.verify(&transfer.render(), &signature)? {
        bail!("giver signature does not verify");
    }
    ledger.add_transaction(transfer).await?;

    ledger.commit(rand::random()).await?;
    ledger.verify_chain().await?;

    let summaries = ledger.summaries().await?;
    println!("{}", BlockSummary::to_json(&summaries)?);
    for participant in directory.participants() {
        println!("{}", participant);
    }

    ledger.shutdown().await?;
    let ledger = join.await?;
    tracing::info!(
        size = ledger.size(),
        blocks_committed = metrics.blocks_committed.get(),
        "Shutting down ledger"
    );

    Ok(())
}

fn lookup_one(directory: &Directory, name: &str) -> anyhow::Result<ParticipantHandle> {
    directory
        .lookup(&ParticipantFilter::new().name(name))?
        .into_iter()
        .next()
        .with_context(|| format!("participant {} not registered", name))
}
