use core_types::nostr::{Event, Tag, UnsignedEvent, ZAP_RECEIPT_KIND, ZAP_REQUEST_KIND};
use secp256k1::{schnorr, Keypair, Message, Secp256k1, XOnlyPublicKey};
use serde_json::Value;
use sha2::{Digest, Sha256};
use xerror::zap::ZapError;

const REQUIRED_FIELDS: [&str; 5] = ["kind", "tags", "sig", "pubkey", "id"];

/// Checks a kind 9734 event against NIP-57 appendix D.
///
/// `json` is the URL-decoded zap request, `invoice_amount` the amount the
/// invoice will be issued for, in millisatoshis. Checks run in a fixed order
/// and the first failing one is reported.
pub fn validate_zap_request(json: &str, invoice_amount: u64) -> Result<Event, ZapError> {
    let value: Value = serde_json::from_str(json).map_err(|_| ZapError::InvalidJson)?;
    let object = value.as_object().ok_or(ZapError::MalformedEvent)?;
    if let Some(missing) = REQUIRED_FIELDS.iter().find(|field| !object.contains_key(**field)) {
        return Err(ZapError::MissingField(*missing));
    }
    let nostr_event: Event = serde_json::from_value(value).map_err(|_| ZapError::MalformedEvent)?;

    if nostr_event.kind != ZAP_REQUEST_KIND {
        return Err(ZapError::NotZapRequest);
    }

    let pubkey_tags_count = nostr_event.count_tags("p");
    if pubkey_tags_count != 1 {
        return Err(ZapError::InvalidPubkeyTagCount(pubkey_tags_count));
    }

    let event_tags_count = nostr_event.count_tags("e");
    if event_tags_count > 1 {
        return Err(ZapError::InvalidEventTagCount(event_tags_count));
    }

    match nostr_event.count_tags("amount") {
        0 => {}
        1 => {
            let found = nostr_event
                .find_tag("amount")
                .and_then(Tag::first_value)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or(ZapError::InvalidAmountTag)?;
            if found != invoice_amount {
                return Err(ZapError::AmountMismatch {
                    expected: invoice_amount,
                    found,
                });
            }
        }
        n => return Err(ZapError::InvalidAmountTagCount(n)),
    }

    verify_signature(&nostr_event)?;

    Ok(nostr_event)
}

/// BIP-340 check of `sig` over the 32 byte `id` with `pubkey`.
fn verify_signature(event: &Event) -> Result<(), ZapError> {
    let pubkey_bytes = hex::decode(&event.pubkey).map_err(|_| ZapError::InvalidPubkey)?;
    let pubkey = XOnlyPublicKey::from_slice(&pubkey_bytes).map_err(|_| ZapError::InvalidPubkey)?;
    let id: [u8; 32] = hex::decode(&event.id)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(ZapError::InvalidSignature)?;
    let sig_bytes = hex::decode(&event.sig).map_err(|_| ZapError::InvalidSignature)?;
    let sig = schnorr::Signature::from_slice(&sig_bytes).map_err(|_| ZapError::InvalidSignature)?;
    Secp256k1::verification_only()
        .verify_schnorr(&sig, &Message::from_digest(id), &pubkey)
        .map_err(|_| ZapError::InvalidSignature)
}

/// The service keypair used to sign zap receipts.
#[derive(Clone)]
pub struct Signer {
    secp: Secp256k1<secp256k1::All>,
    keypair: Keypair,
}

impl Signer {
    pub fn from_hex(secret_key: &str) -> Result<Self, secp256k1::Error> {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_seckey_str(&secp, secret_key.trim())?;
        Ok(Self { secp, keypair })
    }

    pub fn from_slice(secret_key: &[u8]) -> Result<Self, secp256k1::Error> {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_seckey_slice(&secp, secret_key)?;
        Ok(Self { secp, keypair })
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.keypair.x_only_public_key().0.serialize())
    }

    /// Computes the NIP-01 id and signs it. Signing uses no auxiliary
    /// randomness, so the same event always yields the same signature.
    pub fn sign(&self, unsigned: UnsignedEvent) -> Result<Event, ZapError> {
        let canonical = unsigned
            .canonical_json()
            .map_err(|_| ZapError::CouldNotCreateZapNote)?;
        let id: [u8; 32] = Sha256::digest(&canonical).into();
        let sig = self
            .secp
            .sign_schnorr_no_aux_rand(&Message::from_digest(id), &self.keypair);
        Ok(unsigned.into_event(hex::encode(id), hex::encode(sig.as_ref())))
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").field("pubkey", &self.public_key_hex()).finish()
    }
}

/// Builds and signs the kind 9735 receipt for a settled zap.
///
/// Tags are always `description, bolt11, p, [e], [a]`; `created_at` is the
/// node's settle date.
pub fn create_zap_note(
    signer: &Signer,
    description: &str,
    request: &Event,
    bolt11: &str,
    settled_timestamp: u64,
) -> Result<Event, ZapError> {
    let pubkey_tag = request
        .find_tag("p")
        .cloned()
        .ok_or(ZapError::InvalidPubkeyTagCount(0))?;

    let mut tags = vec![
        Tag::new("description", [description]),
        Tag::new("bolt11", [bolt11]),
        pubkey_tag,
    ];
    tags.extend(request.find_tag("e").cloned());
    tags.extend(request.find_tag("a").cloned());

    signer.sign(UnsignedEvent {
        pubkey: signer.public_key_hex(),
        created_at: settled_timestamp,
        kind: ZAP_RECEIPT_KIND,
        tags,
        content: String::new(),
    })
}

/// Relay urls from the request's `relays` tag, in request order.
pub fn request_relays(request: &Event) -> Vec<String> {
    request
        .find_tag("relays")
        .map(|tag| tag.values().to_vec())
        .unwrap_or_default()
}
