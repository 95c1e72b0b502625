use bytes::{Buf, BufMut};
use commonware_codec::{Encode, EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use commonware_cryptography::{
    ed25519,
    sha256::{Digest, Sha256},
    Digestible, Hasher, Signer, Verifier,
};
use commonware_utils::union;
use std::collections::BTreeSet;

pub const NAMESPACE: &[u8] = b"_TESSERA";
pub const TRANSACTION_SUFFIX: &[u8] = b"_TX";

/// Upper bound on the user-supplied memo, in bytes.
pub const MAX_MEMO_LENGTH: usize = 100;
/// Upper bound on entries in a transfer list.
pub const MAX_TRANSFER_ENTRIES: usize = 32;
/// Upper bound on signature pairs carried by one transaction.
pub const MAX_SIGNATURES: usize = 16;

#[inline]
pub fn transaction_namespace(namespace: &[u8]) -> Vec<u8> {
    union(namespace, TRANSACTION_SUFFIX)
}

/// Ledger-assigned account number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub u64);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0.0.{}", self.0)
    }
}

impl Write for AccountId {
    fn write(&self, writer: &mut impl BufMut) {
        self.0.write(writer);
    }
}

impl Read for AccountId {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self(u64::read(reader)?))
    }
}

impl FixedSize for AccountId {
    const SIZE: usize = u64::SIZE;
}

/// Ledger-assigned token number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenId(pub u64);

impl Write for TokenId {
    fn write(&self, writer: &mut impl BufMut) {
        self.0.write(writer);
    }
}

impl Read for TokenId {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self(u64::read(reader)?))
    }
}

impl FixedSize for TokenId {
    const SIZE: usize = u64::SIZE;
}

/// A consensus-assigned instant. The only time source the execution
/// engine is allowed to observe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConsensusTime {
    pub seconds: u64,
    pub nanos: u32,
}

impl ConsensusTime {
    pub fn new(seconds: u64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }
}

impl Write for ConsensusTime {
    fn write(&self, writer: &mut impl BufMut) {
        self.seconds.write(writer);
        self.nanos.write(writer);
    }
}

impl Read for ConsensusTime {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            seconds: u64::read(reader)?,
            nanos: u32::read(reader)?,
        })
    }
}

impl FixedSize for ConsensusTime {
    const SIZE: usize = u64::SIZE + u32::SIZE;
}

/// Identifies one transaction: the payer that funds it plus the first
/// instant at which it may reach consensus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId {
    pub payer: AccountId,
    pub valid_start: ConsensusTime,
}

impl Write for TransactionId {
    fn write(&self, writer: &mut impl BufMut) {
        self.payer.write(writer);
        self.valid_start.write(writer);
    }
}

impl Read for TransactionId {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            payer: AccountId::read(reader)?,
            valid_start: ConsensusTime::read(reader)?,
        })
    }
}

impl FixedSize for TransactionId {
    const SIZE: usize = AccountId::SIZE + ConsensusTime::SIZE;
}

/// The operation type of a transaction, used to route dispatches to
/// handlers and to meter admission control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Functionality {
    AccountCreate,
    CryptoTransfer,
    TokenMint,
}

impl Functionality {
    pub const ALL: [Self; 3] = [Self::AccountCreate, Self::CryptoTransfer, Self::TokenMint];
}

/// Response code recorded on every receipt, successful or not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    /// The dispatch succeeded but its effects were later undone by a
    /// parent revert. The receipt remains visible.
    RevertedSuccess,
    InvalidTransactionBody,
    MemoTooLong,
    InvalidAccountAmounts,
    AccountNotFound,
    AccountDeleted,
    InsufficientPayerBalance,
    InsufficientAccountBalance,
    InvalidSignature,
    UnresolvableRequiredSigners,
    NotSupported,
    TokenNotFound,
    TokenMaxSupplyReached,
    Busy,
}

impl ResponseCode {
    /// True for codes that commit state (including a success later
    /// marked reverted).
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::RevertedSuccess)
    }
}

/// The business payload of a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Create an account funded from the payer (tag 0).
    AccountCreate {
        key: ed25519::PublicKey,
        initial_balance: u64,
    },
    /// Multi-party balance adjustment; amounts must sum to zero (tag 1).
    CryptoTransfer { transfers: Vec<(AccountId, i64)> },
    /// Mint supply to the token treasury (tag 2).
    TokenMint { token: TokenId, amount: u64 },
}

impl Operation {
    pub fn functionality(&self) -> Functionality {
        match self {
            Self::AccountCreate { .. } => Functionality::AccountCreate,
            Self::CryptoTransfer { .. } => Functionality::CryptoTransfer,
            Self::TokenMint { .. } => Functionality::TokenMint,
        }
    }
}

impl Write for Operation {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::AccountCreate {
                key,
                initial_balance,
            } => {
                0u8.write(writer);
                key.write(writer);
                initial_balance.write(writer);
            }
            Self::CryptoTransfer { transfers } => {
                1u8.write(writer);
                (transfers.len() as u32).write(writer);
                for (account, amount) in transfers {
                    account.write(writer);
                    amount.write(writer);
                }
            }
            Self::TokenMint { token, amount } => {
                2u8.write(writer);
                token.write(writer);
                amount.write(writer);
            }
        }
    }
}

impl Read for Operation {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let operation = match u8::read(reader)? {
            0 => Self::AccountCreate {
                key: ed25519::PublicKey::read(reader)?,
                initial_balance: u64::read(reader)?,
            },
            1 => {
                let len = u32::read(reader)? as usize;
                if len > MAX_TRANSFER_ENTRIES {
                    return Err(Error::Invalid("Operation", "transfer list too long"));
                }
                let mut transfers = Vec::with_capacity(len);
                for _ in 0..len {
                    let account = AccountId::read(reader)?;
                    let amount = i64::read(reader)?;
                    transfers.push((account, amount));
                }
                Self::CryptoTransfer { transfers }
            }
            2 => Self::TokenMint {
                token: TokenId::read(reader)?,
                amount: u64::read(reader)?,
            },
            kind => return Err(Error::InvalidEnum(kind)),
        };
        Ok(operation)
    }
}

impl EncodeSize for Operation {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::AccountCreate { key, .. } => key.encode_size() + u64::SIZE,
                Self::CryptoTransfer { transfers } => {
                    u32::SIZE + transfers.len() * (AccountId::SIZE + i64::SIZE)
                }
                Self::TokenMint { .. } => TokenId::SIZE + u64::SIZE,
            }
    }
}

/// Everything a transaction declares before signatures are attached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionBody {
    pub transaction_id: TransactionId,
    pub memo: String,
    pub operation: Operation,
}

impl TransactionBody {
    pub fn payer(&self) -> AccountId {
        self.transaction_id.payer
    }

    pub fn functionality(&self) -> Functionality {
        self.operation.functionality()
    }
}

impl Write for TransactionBody {
    fn write(&self, writer: &mut impl BufMut) {
        self.transaction_id.write(writer);
        (self.memo.len() as u32).write(writer);
        writer.put_slice(self.memo.as_bytes());
        self.operation.write(writer);
    }
}

impl Read for TransactionBody {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let transaction_id = TransactionId::read(reader)?;
        let memo_len = u32::read(reader)? as usize;
        if memo_len > MAX_MEMO_LENGTH {
            return Err(Error::Invalid("TransactionBody", "memo too long"));
        }
        if reader.remaining() < memo_len {
            return Err(Error::EndOfBuffer);
        }
        let mut memo_bytes = vec![0u8; memo_len];
        reader.copy_to_slice(&mut memo_bytes);
        let memo = String::from_utf8(memo_bytes)
            .map_err(|_| Error::Invalid("TransactionBody", "invalid UTF-8 in memo"))?;
        let operation = Operation::read(reader)?;

        Ok(Self {
            transaction_id,
            memo,
            operation,
        })
    }
}

impl EncodeSize for TransactionBody {
    fn encode_size(&self) -> usize {
        TransactionId::SIZE + u32::SIZE + self.memo.len() + self.operation.encode_size()
    }
}

/// One signature over the body, attributed to its signing key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignaturePair {
    pub public: ed25519::PublicKey,
    pub signature: ed25519::Signature,
}

impl Write for SignaturePair {
    fn write(&self, writer: &mut impl BufMut) {
        self.public.write(writer);
        self.signature.write(writer);
    }
}

impl Read for SignaturePair {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            public: ed25519::PublicKey::read(reader)?,
            signature: ed25519::Signature::read(reader)?,
        })
    }
}

impl EncodeSize for SignaturePair {
    fn encode_size(&self) -> usize {
        self.public.encode_size() + self.signature.encode_size()
    }
}

/// A signed transaction as delivered by the consensus transaction
/// source: one body plus a map of signatures over it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub body: TransactionBody,
    pub signatures: Vec<SignaturePair>,
}

impl Transaction {
    /// Sign `body` with a single key.
    pub fn sign(private: &ed25519::PrivateKey, body: TransactionBody) -> Self {
        let mut transaction = Self {
            body,
            signatures: Vec::new(),
        };
        transaction.also_sign(private);
        transaction
    }

    /// Attach an additional signature over the same body.
    pub fn also_sign(&mut self, private: &ed25519::PrivateKey) {
        let signature = private.sign(
            &transaction_namespace(NAMESPACE),
            &self.body.encode(),
        );
        self.signatures.push(SignaturePair {
            public: private.public_key(),
            signature,
        });
    }

    /// The set of keys whose attached signatures verify against the
    /// body. Computed once, ahead of execution; the engine only ever
    /// looks the results up.
    pub fn verified_keys(&self) -> BTreeSet<ed25519::PublicKey> {
        let namespace = transaction_namespace(NAMESPACE);
        let payload = self.body.encode();
        self.signatures
            .iter()
            .filter(|pair| pair.public.verify(&namespace, &payload, &pair.signature))
            .map(|pair| pair.public.clone())
            .collect()
    }
}

impl Write for Transaction {
    fn write(&self, writer: &mut impl BufMut) {
        self.body.write(writer);
        (self.signatures.len() as u32).write(writer);
        for pair in &self.signatures {
            pair.write(writer);
        }
    }
}

impl Read for Transaction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let body = TransactionBody::read(reader)?;
        let len = u32::read(reader)? as usize;
        if len > MAX_SIGNATURES {
            return Err(Error::Invalid("Transaction", "too many signatures"));
        }
        let mut signatures = Vec::with_capacity(len);
        for _ in 0..len {
            signatures.push(SignaturePair::read(reader)?);
        }

        Ok(Self { body, signatures })
    }
}

impl EncodeSize for Transaction {
    fn encode_size(&self) -> usize {
        self.body.encode_size()
            + u32::SIZE
            + self
                .signatures
                .iter()
                .map(EncodeSize::encode_size)
                .sum::<usize>()
    }
}

impl Digestible for Transaction {
    type Digest = Digest;

    fn digest(&self) -> Digest {
        let mut hasher = Sha256::new();
        // We don't include the signatures as part of the digest (any
        // valid signature set authorizes the same body).
        hasher.update(self.body.encode().as_ref());
        hasher.finalize()
    }
}

/// Durable account state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub key: ed25519::PublicKey,
    pub balance: u64,
    pub deleted: bool,
    /// Staking reward earned but not yet paid out. Settled the next
    /// time a transfer touches the account.
    pub pending_reward: u64,
}

impl Write for Account {
    fn write(&self, writer: &mut impl BufMut) {
        self.key.write(writer);
        self.balance.write(writer);
        (self.deleted as u8).write(writer);
        self.pending_reward.write(writer);
    }
}

impl Read for Account {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let key = ed25519::PublicKey::read(reader)?;
        let balance = u64::read(reader)?;
        let deleted = match u8::read(reader)? {
            0 => false,
            1 => true,
            _ => return Err(Error::Invalid("Account", "invalid deleted flag")),
        };
        let pending_reward = u64::read(reader)?;

        Ok(Self {
            key,
            balance,
            deleted,
            pending_reward,
        })
    }
}

impl EncodeSize for Account {
    fn encode_size(&self) -> usize {
        self.key.encode_size() + u64::SIZE + u8::SIZE + u64::SIZE
    }
}

/// Durable token state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub admin_key: ed25519::PublicKey,
    pub treasury: AccountId,
    pub total_supply: u64,
    pub max_supply: u64,
}

impl Write for Token {
    fn write(&self, writer: &mut impl BufMut) {
        self.admin_key.write(writer);
        self.treasury.write(writer);
        self.total_supply.write(writer);
        self.max_supply.write(writer);
    }
}

impl Read for Token {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            admin_key: ed25519::PublicKey::read(reader)?,
            treasury: AccountId::read(reader)?,
            total_supply: u64::read(reader)?,
            max_supply: u64::read(reader)?,
        })
    }
}

impl EncodeSize for Token {
    fn encode_size(&self) -> usize {
        self.admin_key.encode_size() + AccountId::SIZE + u64::SIZE + u64::SIZE
    }
}

/// Keys of the shared ledger state.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Account state (tag 0)
    Account(AccountId),
    /// Token state (tag 1)
    Token(TokenId),
    /// Next unassigned entity number (tag 2)
    EntityCounter,
}

impl Write for Key {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(id) => {
                0u8.write(writer);
                id.write(writer);
            }
            Self::Token(id) => {
                1u8.write(writer);
                id.write(writer);
            }
            Self::EntityCounter => 2u8.write(writer),
        }
    }
}

impl Read for Key {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let key = match u8::read(reader)? {
            0 => Self::Account(AccountId::read(reader)?),
            1 => Self::Token(TokenId::read(reader)?),
            2 => Self::EntityCounter,
            kind => return Err(Error::InvalidEnum(kind)),
        };
        Ok(key)
    }
}

impl EncodeSize for Key {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Account(_) => AccountId::SIZE,
                Self::Token(_) => TokenId::SIZE,
                Self::EntityCounter => 0,
            }
    }
}

/// Values of the shared ledger state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Account(Account),
    Token(Token),
    EntityCounter(u64),
}

impl Write for Value {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(account) => {
                0u8.write(writer);
                account.write(writer);
            }
            Self::Token(token) => {
                1u8.write(writer);
                token.write(writer);
            }
            Self::EntityCounter(next) => {
                2u8.write(writer);
                next.write(writer);
            }
        }
    }
}

impl Read for Value {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = match u8::read(reader)? {
            0 => Self::Account(Account::read(reader)?),
            1 => Self::Token(Token::read(reader)?),
            2 => Self::EntityCounter(u64::read(reader)?),
            kind => return Err(Error::InvalidEnum(kind)),
        };
        Ok(value)
    }
}

impl EncodeSize for Value {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Account(account) => account.encode_size(),
                Self::Token(token) => token.encode_size(),
                Self::EntityCounter(_) => u64::SIZE,
            }
    }
}

/// The finalized form of one dispatch's record, handed to the record
/// sink after the top-level transaction resolves. The engine never
/// serializes these; persistence is the sink's concern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,
    pub functionality: Functionality,
    pub status: ResponseCode,
    pub consensus_time: ConsensusTime,
    pub transfers: Vec<(AccountId, i64)>,
    pub created_account: Option<AccountId>,
    pub new_total_supply: Option<u64>,
    pub paid_staking_rewards: Vec<(AccountId, u64)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_codec::DecodeExt;
    use commonware_cryptography::{ed25519::PrivateKey, Signer as _};

    fn transfer_body(payer: u64) -> TransactionBody {
        TransactionBody {
            transaction_id: TransactionId {
                payer: AccountId(payer),
                valid_start: ConsensusTime::new(1_000, 0),
            },
            memo: "hello".to_string(),
            operation: Operation::CryptoTransfer {
                transfers: vec![(AccountId(payer), -5), (AccountId(99), 5)],
            },
        }
    }

    #[test]
    fn test_transaction_codec_roundtrip() {
        let private = PrivateKey::from_seed(7);
        let transaction = Transaction::sign(&private, transfer_body(2));
        let decoded = Transaction::decode(transaction.encode()).unwrap();
        assert_eq!(transaction, decoded);
    }

    #[test]
    fn test_verified_keys_excludes_bad_signature() {
        let signer = PrivateKey::from_seed(1);
        let other = PrivateKey::from_seed(2);
        let mut transaction = Transaction::sign(&signer, transfer_body(2));
        // Tamper: attach `other`'s signature computed over a different body.
        let stray = Transaction::sign(&other, transfer_body(3));
        transaction.signatures.push(stray.signatures[0].clone());

        let verified = transaction.verified_keys();
        assert!(verified.contains(&signer.public_key()));
        assert!(!verified.contains(&other.public_key()));
    }

    #[test]
    fn test_body_rejects_oversized_memo() {
        let mut body = transfer_body(2);
        body.memo = "m".repeat(MAX_MEMO_LENGTH + 1);
        let encoded = body.encode();
        assert!(TransactionBody::decode(encoded).is_err());
    }

    #[test]
    fn test_digest_ignores_signatures() {
        let body = transfer_body(2);
        let one = Transaction::sign(&PrivateKey::from_seed(1), body.clone());
        let mut two = Transaction::sign(&PrivateKey::from_seed(1), body);
        two.also_sign(&PrivateKey::from_seed(2));
        assert_eq!(one.digest(), two.digest());
    }
}
