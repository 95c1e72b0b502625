//! Production transaction handlers.

mod account_create;
mod crypto_transfer;
mod token_mint;

pub use account_create::AccountCreateHandler;
pub use crypto_transfer::CryptoTransferHandler;
pub use token_mint::TokenMintHandler;

use crate::registry::{HandlerRegistry, PreCheckError};
use tessera_types::{Functionality, ResponseCode, TransactionBody, MAX_MEMO_LENGTH};

/// A registry with every production handler registered.
pub fn production_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(
        Functionality::AccountCreate,
        Box::new(AccountCreateHandler),
    );
    registry.register(
        Functionality::CryptoTransfer,
        Box::new(CryptoTransferHandler),
    );
    registry.register(Functionality::TokenMint, Box::new(TokenMintHandler));
    registry
}

pub(crate) fn check_memo(body: &TransactionBody) -> Result<(), PreCheckError> {
    if body.memo.len() > MAX_MEMO_LENGTH {
        return Err(ResponseCode::MemoTooLong.into());
    }
    Ok(())
}
