use anchor_lang::prelude::*;

use crate::errors::GraphError;
use crate::state::{ConcurrentMerkleTree, Controller, TreeConfig};
use crate::CONTROLLER_SEED;

#[derive(Accounts)]
pub struct InitializeTree<'info> {
    #[account(
        mut,
        seeds = [CONTROLLER_SEED],
        bump = tree_controller.bump,
        has_one = authority @ GraphError::Unauthorized,
    )]
    pub tree_controller: Account<'info, Controller>,

    pub authority: Signer<'info>,

    /// CHECK: zeroed tree storage allocated by the caller; size and owner are checked
    #[account(mut, owner = crate::ID @ GraphError::InvalidTreeAccount)]
    pub tree: AccountInfo<'info>,
}

pub fn handler(ctx: Context<InitializeTree>) -> Result<()> {
    let tree_controller = &mut ctx.accounts.tree_controller;
    require!(!tree_controller.is_bound(), GraphError::AlreadyBound);

    let clock = Clock::get()?;
    let root = {
        let mut data = ctx.accounts.tree.try_borrow_mut_data()?;
        let tree = ConcurrentMerkleTree::initialize(
            &mut data[..],
            TreeConfig::GRAPH,
            tree_controller.key(),
            clock.slot,
        )?;
        tree.root()
    };

    tree_controller.tree = ctx.accounts.tree.key();

    msg!(
        "SGRAPH: Tree {} bound, depth {} buffer {} canopy {}, root {:?}",
        tree_controller.tree,
        TreeConfig::GRAPH.max_depth,
        TreeConfig::GRAPH.max_buffer_size,
        TreeConfig::GRAPH.canopy_depth,
        root
    );

    Ok(())
}
