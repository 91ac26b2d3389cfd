use anchor_lang::prelude::*;

use crate::state::Provider;

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct InitializeProviderParams {
    pub authority: Pubkey,
    pub name: String,
    pub website: String,
}

#[derive(Accounts)]
#[instruction(args: InitializeProviderParams)]
pub struct InitializeProvider<'info> {
    #[account(
        init_if_needed,
        payer = payer,
        space = Provider::space(&args.name, &args.website),
    )]
    pub provider: Account<'info, Provider>,

    #[account(mut)]
    pub payer: Signer<'info>,

    pub system_program: Program<'info, System>,
}

pub fn handler(ctx: Context<InitializeProvider>, args: InitializeProviderParams) -> Result<()> {
    let provider = &mut ctx.accounts.provider;
    provider.register(args.authority, args.name, args.website)?;

    msg!(
        "SGRAPH: Provider {} registered, authority {}",
        provider.key(),
        provider.authority
    );

    Ok(())
}
