use anchor_lang::prelude::*;

use crate::errors::GraphError;
use crate::state::{ConcurrentMerkleTree, Controller, Relation};
use crate::CONTROLLER_SEED;

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct VerifyRelationParams {
    pub relation: Relation,
    pub leaf_index: u32,
    pub root: [u8; 32],
    pub proof: Vec<[u8; 32]>,
}

#[derive(Accounts)]
pub struct VerifyRelation<'info> {
    /// CHECK: must be the tree bound to the controller
    pub tree: AccountInfo<'info>,

    #[account(
        seeds = [CONTROLLER_SEED],
        bump = tree_controller.bump,
        has_one = tree @ GraphError::InvalidTreeAccount,
    )]
    pub tree_controller: Account<'info, Controller>,
}

pub fn handler(ctx: Context<VerifyRelation>, args: VerifyRelationParams) -> Result<()> {
    let data = ctx.accounts.tree.try_borrow_data()?;
    let tree = ConcurrentMerkleTree::load(&data[..])?;

    tree.verify_leaf(
        args.root,
        args.relation.leaf_hash(),
        &args.proof,
        args.leaf_index,
    )?;

    msg!(
        "SGRAPH: Relation verified, {} -> {} at leaf {}, active {}",
        args.relation.from,
        args.relation.to,
        args.leaf_index,
        args.relation.is_active()
    );

    Ok(())
}
