use anchor_lang::prelude::*;

use crate::errors::GraphError;
use crate::events::{RelationChange, RelationEvent};
use crate::state::{ConcurrentMerkleTree, Controller, Provider, Relation};
use crate::CONTROLLER_SEED;

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct DisconnectRelationParams {
    /// Relation as currently committed at `leaf_index`
    pub relation: Relation,
    pub leaf_index: u32,
    /// Root the proof was built against; any root in the changelog buffer
    pub root: [u8; 32],
    pub proof: Vec<[u8; 32]>,
}

#[derive(Accounts)]
pub struct DisconnectRelation<'info> {
    #[account(has_one = authority @ GraphError::Unauthorized)]
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

pub fn handler(ctx: Context<DisconnectRelation>, args: DisconnectRelationParams) -> Result<()> {
    let DisconnectRelationParams {
        mut relation,
        leaf_index,
        root,
        proof,
    } = args;

    require_keys_eq!(
        relation.provider,
        ctx.accounts.provider.key(),
        GraphError::Unauthorized
    );

    let clock = Clock::get()?;
    let (seq, new_root) = {
        let mut data = ctx.accounts.tree.try_borrow_mut_data()?;
        let mut tree = ConcurrentMerkleTree::load(&mut data[..])?;
        require_keys_eq!(
            tree.header().authority,
            ctx.accounts.tree_controller.key(),
            GraphError::InvalidTreeAccount
        );

        // The relation must be committed before its state is judged.
        let verified = tree.verify_leaf(root, relation.leaf_hash(), &proof, leaf_index)?;
        relation.disconnect(clock.unix_timestamp)?;

        let new_root = tree.replace_leaf(verified, relation.leaf_hash())?;
        (tree.sequence_number(), new_root)
    };

    msg!(
        "SGRAPH: Relation {} -> {} disconnected at leaf {}",
        relation.from,
        relation.to,
        leaf_index
    );

    emit!(RelationEvent {
        tree: ctx.accounts.tree.key(),
        leaf_index,
        seq,
        root: new_root,
        change: RelationChange::Disconnected,
        relation,
    });

    Ok(())
}
