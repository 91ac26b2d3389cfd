use anchor_lang::prelude::*;

use crate::errors::GraphError;
use crate::events::{RelationChange, RelationEvent};
use crate::state::{ConcurrentMerkleTree, Controller, Provider, Relation};
use crate::CONTROLLER_SEED;

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct AddRelationParams {
    pub from: Pubkey,
    pub to: Pubkey,
    pub extra: Vec<u8>,
}

#[derive(Accounts)]
pub struct AddRelation<'info> {
    #[account(mut, has_one = authority @ GraphError::Unauthorized)]
    pub provider: Account<'info, Provider>,

    pub authority: Signer<'info>,

    /// CHECK: must be the tree bound to the controller
    #[account(mut)]
    pub tree: AccountInfo<'info>,

    #[account(
        seeds = [CONTROLLER_SEED],
        bump = tree_controller.bump,
        has_one = tree @ GraphError::InvalidTreeAccount,
    )]
    pub tree_controller: Account<'info, Controller>,
}

pub fn handler(ctx: Context<AddRelation>, args: AddRelationParams) -> Result<()> {
    let clock = Clock::get()?;
    let relation = Relation::new(
        args.from,
        args.to,
        ctx.accounts.provider.key(),
        clock.unix_timestamp,
        args.extra,
    );

    let (leaf_index, seq, root) = {
        let mut data = ctx.accounts.tree.try_borrow_mut_data()?;
        let mut tree = ConcurrentMerkleTree::load(&mut data[..])?;
        require_keys_eq!(
            tree.header().authority,
            ctx.accounts.tree_controller.key(),
            GraphError::InvalidTreeAccount
        );
        let leaf_index = tree.append(relation.leaf_hash())?;
        (leaf_index, tree.sequence_number(), tree.root())
    };

    let relations_count = ctx.accounts.provider.record_relation()?;

    msg!(
        "SGRAPH: Relation {} -> {} appended at leaf {}, provider total {}",
        relation.from,
        relation.to,
        leaf_index,
        relations_count
    );

    emit!(RelationEvent {
        tree: ctx.accounts.tree.key(),
        leaf_index,
        seq,
        root,
        change: RelationChange::Connected,
        relation,
    });

    Ok(())
}
