//! Agent-side flow: negotiate, build a relayed escrow deposit, sign it, and
//! hand it to the relayer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use acp_relay::{
    shard_of, AccountKey, Address, DepositInstruction, EscrowPayloadBuilder, NetworkConfig,
    NetworkProvider, ProposalSigner, RelayError, RelayPayload, Relayer, Rfp, ShardKeyring,
    SimulationOutcome, Transaction,
};
use alloy_primitives::U256;

#[derive(Default)]
struct CountingProvider {
    submissions: AtomicUsize,
}

impl NetworkProvider for CountingProvider {
    async fn simulate(&self, tx: &Transaction) -> Result<SimulationOutcome, RelayError> {
        if tx.relayer_signature.is_none() {
            return Ok(SimulationOutcome::failed("missing relayer signature"));
        }
        Ok(SimulationOutcome::succeeded())
    }

    async fn submit(&self, _tx: &Transaction) -> Result<String, RelayError> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{n:064x}"))
    }
}

fn keyring() -> Arc<ShardKeyring> {
    let mut ring = ShardKeyring::new(3);
    for shard in 0..3 {
        let key = (0u8..=255)
            .map(|i| AccountKey::from_bytes(&[i; 32]))
            .find(|k| shard_of(&k.address(), 3) == shard)
            .unwrap();
        ring = ring.with_key(shard, key).unwrap();
    }
    Arc::new(ring)
}

fn escrow_contract() -> Address {
    let mut pk = [0u8; 32];
    pk[8] = 0x05;
    pk[31] = 0x02;
    Address::new(pk)
}

#[tokio::test]
async fn negotiated_deposit_is_relayed() {
    let config = NetworkConfig::default();
    let keyring = keyring();
    let agent = AccountKey::from_bytes(&[0xa5; 32]);

    let vendor = ProposalSigner::new(Some(AccountKey::from_bytes(&[0x5a; 32])));
    let proposal = vendor
        .create_proposal(&Rfp {
            rfp_id: "rfp-9".to_string(),
            client_id: agent.address().to_bech32(),
            task_description: "label 500 images".to_string(),
            budget_limit: "2500000".to_string(),
            token_identifier: "native".to_string(),
            deadline_block: 9_000_000,
            min_reputation: Some(10),
        })
        .unwrap();
    acp_relay::negotiation::verify_proposal(&proposal, &agent.address().to_bech32()).unwrap();

    let builder =
        EscrowPayloadBuilder::new(escrow_contract(), config.clone()).with_keyring(keyring.clone());
    let deposit = DepositInstruction {
        job_id: proposal.job_id.clone(),
        token: proposal.token.clone(),
        token_nonce: 0,
        amount: U256::from_str_radix(&proposal.price, 10).unwrap(),
        counterparty: proposal.vendor,
        poa_hash: proposal.poa_hash.clone(),
        deadline: 1_800_000_000,
    };
    let mut tx = builder
        .relayed(builder.deposit(agent.address(), 0, &deposit).unwrap())
        .unwrap();
    tx.signature = Some(agent.sign(&tx.signing_bytes().unwrap()));

    let relayer = Relayer::new(CountingProvider::default(), keyring.clone(), config);
    let payload = RelayPayload::from_signed(&tx).unwrap();
    assert!(relayer.verify(&payload));

    let receipt = relayer.broadcast(&payload).await.unwrap();
    assert_eq!(receipt.tx_hash.len(), 64);
    assert_eq!(receipt.shard, shard_of(&agent.address(), 3));
    assert_eq!(relayer.provider().submissions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn payload_survives_json_transport() {
    let config = NetworkConfig::default();
    let keyring = keyring();
    let agent = AccountKey::from_bytes(&[0x3c; 32]);

    let mut tx = Transaction::new(agent.address(), Address::new([9; 32]), 41, &config);
    tx.value = U256::from(10u64).pow(U256::from(18u64));
    tx.relayer = keyring.relayer_for(&agent.address());
    tx.signature = Some(agent.sign(&tx.signing_bytes().unwrap()));

    let json = serde_json::to_string(&RelayPayload::from_signed(&tx).unwrap()).unwrap();
    let payload: RelayPayload = serde_json::from_str(&json).unwrap();

    let relayer = Relayer::new(CountingProvider::default(), keyring, config);
    assert!(relayer.verify(&payload));
    let packed = relayer.pack(&payload).unwrap();
    assert_eq!(packed.value, tx.value);
    assert!(packed.relayer_signature.is_some());
}
