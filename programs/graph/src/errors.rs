use anchor_lang::prelude::*;

#[error_code]
pub enum GraphError {
    #[msg("Signer is not the provider authority")]
    Unauthorized,
    #[msg("Tree controller is already initialized")]
    AlreadyInitialized,
    #[msg("Tree controller is already bound to a tree")]
    AlreadyBound,
    #[msg("Provider account is already initialized")]
    DuplicateProvider,
    #[msg("Tree has no spare leaf capacity")]
    TreeFull,
    #[msg("Proof root is no longer in the changelog buffer, refresh and retry")]
    StaleProof,
    #[msg("Invalid merkle proof")]
    InvalidProof,
    #[msg("Relation is already disconnected")]
    AlreadyDisconnected,
    #[msg("Overflow occured")]
    Overflow,
    #[msg("Provider name or website is too long")]
    ProviderInfoTooLong,
    #[msg("Leaf index is past the last appended leaf")]
    LeafIndexOutOfBounds,
    #[msg("Unsupported tree sizing parameters")]
    InvalidTreeConfig,
    #[msg("Tree account does not match the controller or has the wrong size")]
    InvalidTreeAccount,
    #[msg("Tree account is not initialized")]
    TreeNotInitialized,
}
