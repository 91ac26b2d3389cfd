use anchor_lang::prelude::*;

use crate::errors::GraphError;
use crate::state::Controller;
use crate::CONTROLLER_SEED;

#[derive(Accounts)]
pub struct InitializeController<'info> {
    #[account(
        init_if_needed,
        payer = payer,
        space = Controller::SIZE,
        seeds = [CONTROLLER_SEED],
        bump,
    )]
    pub tree_controller: Account<'info, Controller>,

    pub authority: Signer<'info>,

    #[account(mut)]
    pub payer: Signer<'info>,

    pub system_program: Program<'info, System>,
}

pub fn handler(ctx: Context<InitializeController>) -> Result<()> {
    let tree_controller = &mut ctx.accounts.tree_controller;
    require!(
        !tree_controller.is_initialized(),
        GraphError::AlreadyInitialized
    );

    tree_controller.authority = ctx.accounts.authority.key();
    tree_controller.tree = Pubkey::default();
    tree_controller.bump = ctx.bumps.tree_controller;

    msg!(
        "SGRAPH: Controller initialized, authority {}",
        tree_controller.authority
    );

    Ok(())
}
