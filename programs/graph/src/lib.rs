use anchor_lang::prelude::*;

pub mod errors;
pub mod events;
pub mod instructions;
pub mod state;

use instructions::*;

pub use errors::GraphError;
pub use events::*;
pub use state::{Controller, LeafType, Provider, Relation, TreeConfig};

declare_id!("graph8zS8zjLVJHdiSvP7S9PP7hNJpnHdbnJLR81FMg");

/// Seed of the singleton tree controller PDA.
pub const CONTROLLER_SEED: &[u8] = b"controller";

#[program]
pub mod graph {
    use super::*;

    /// Create the singleton tree controller
    pub fn initialize_controller(ctx: Context<InitializeController>) -> Result<()> {
        instructions::initialize_controller::handler(ctx)
    }

    /// Lay out the commitment tree in a pre-allocated account and bind it
    /// to the controller. One time only.
    pub fn initialize_tree(ctx: Context<InitializeTree>) -> Result<()> {
        instructions::initialize_tree::handler(ctx)
    }

    /// Register a provider at a fresh account
    pub fn initialize_provider(
        ctx: Context<InitializeProvider>,
        args: InitializeProviderParams,
    ) -> Result<()> {
        instructions::initialize_provider::handler(ctx, args)
    }

    /// Append a relation signed by the provider authority
    pub fn add_relation(ctx: Context<AddRelation>, args: AddRelationParams) -> Result<()> {
        instructions::add_relation::handler(ctx, args)
    }

    /// Mark a committed relation disconnected, rewriting its leaf
    pub fn disconnect_relation(
        ctx: Context<DisconnectRelation>,
        args: DisconnectRelationParams,
    ) -> Result<()> {
        instructions::disconnect_relation::handler(ctx, args)
    }

    /// Verify a relation is committed (on-chain verification for other programs via CPI)
    pub fn verify_relation(ctx: Context<VerifyRelation>, args: VerifyRelationParams) -> Result<()> {
        instructions::verify_relation::handler(ctx, args)
    }
}
