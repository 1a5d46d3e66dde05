// ============ ERC20 Token Contract ============
// Fungible token used both as the lockable governance token and as the
// fee token paid out by the distributor.
//
// Surface:
// - balances, transfer, transfer_from
// - approve / allowance / increase_allowance / decrease_allowance
// - minter-gated mint, plus an unrestricted mint_for_testing hook
//
// An allowance of u128::MAX is treated as infinite and never decreased.

use std::collections::BTreeMap;

use thiserror::Error;
use vefee_types::{Address, Event, TxContext};

// ============ Error Types ============

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("insufficient balance: have {available}, need {requested}")]
    InsufficientBalance { available: u128, requested: u128 },

    #[error("insufficient allowance: have {available}, need {requested}")]
    InsufficientAllowance { available: u128, requested: u128 },

    #[error("allowance below zero")]
    AllowanceUnderflow,

    #[error("caller is not the minter")]
    NotMinter,

    #[error("supply overflow")]
    Overflow,
}

// ============ Token State ============

#[derive(Clone, Debug)]
pub struct Erc20 {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    minter: Address,
    total_supply: u128,
    balances: BTreeMap<Address, u128>,
    allowances: BTreeMap<(Address, Address), u128>,
}

impl Erc20 {
    pub fn new(address: Address, name: &str, symbol: &str, decimals: u8, minter: Address) -> Self {
        Self {
            address,
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
            minter,
            total_supply: 0,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        }
    }

    // ============ Views ============

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn balance_of(&self, owner: &Address) -> u128 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    pub fn minter(&self) -> Address {
        self.minter
    }

    // ============ Allowances ============

    /// Overwrite the caller's allowance for `spender`
    pub fn approve(&mut self, ctx: &mut TxContext, spender: Address, value: u128) -> bool {
        let owner = ctx.caller;
        self.set_allowance(ctx, owner, spender, value);
        true
    }

    pub fn increase_allowance(
        &mut self,
        ctx: &mut TxContext,
        spender: Address,
        added: u128,
    ) -> Result<bool, TokenError> {
        let owner = ctx.caller;
        let value = self
            .allowance(&owner, &spender)
            .checked_add(added)
            .ok_or(TokenError::Overflow)?;
        self.set_allowance(ctx, owner, spender, value);
        Ok(true)
    }

    pub fn decrease_allowance(
        &mut self,
        ctx: &mut TxContext,
        spender: Address,
        subtracted: u128,
    ) -> Result<bool, TokenError> {
        let owner = ctx.caller;
        let value = self
            .allowance(&owner, &spender)
            .checked_sub(subtracted)
            .ok_or(TokenError::AllowanceUnderflow)?;
        self.set_allowance(ctx, owner, spender, value);
        Ok(true)
    }

    fn set_allowance(
        &mut self,
        ctx: &mut TxContext,
        owner: Address,
        spender: Address,
        value: u128,
    ) {
        self.allowances.insert((owner, spender), value);
        ctx.emit(Event::Approval {
            owner,
            spender,
            value,
        });
    }

    // ============ Transfers ============

    pub fn transfer(
        &mut self,
        ctx: &mut TxContext,
        to: Address,
        value: u128,
    ) -> Result<bool, TokenError> {
        let from = ctx.caller;
        self.move_balance(ctx, from, to, value)?;
        Ok(true)
    }

    /// Move `value` from `from` to `to`, spending the caller's allowance
    pub fn transfer_from(
        &mut self,
        ctx: &mut TxContext,
        from: Address,
        to: Address,
        value: u128,
    ) -> Result<bool, TokenError> {
        let spender = ctx.caller;
        let allowed = self.allowance(&from, &spender);
        if allowed < value {
            return Err(TokenError::InsufficientAllowance {
                available: allowed,
                requested: value,
            });
        }
        self.move_balance(ctx, from, to, value)?;
        if allowed != u128::MAX {
            self.allowances.insert((from, spender), allowed - value);
        }
        Ok(true)
    }

    fn move_balance(
        &mut self,
        ctx: &mut TxContext,
        from: Address,
        to: Address,
        value: u128,
    ) -> Result<(), TokenError> {
        let available = self.balance_of(&from);
        if available < value {
            return Err(TokenError::InsufficientBalance {
                available,
                requested: value,
            });
        }
        self.balances.insert(from, available - value);
        let credited = self.balance_of(&to) + value;
        self.balances.insert(to, credited);
        ctx.emit(Event::Transfer { from, to, value });
        Ok(())
    }

    // ============ Supply ============

    pub fn set_minter(&mut self, ctx: &TxContext, minter: Address) -> Result<(), TokenError> {
        if ctx.caller != self.minter {
            return Err(TokenError::NotMinter);
        }
        self.minter = minter;
        Ok(())
    }

    pub fn mint(
        &mut self,
        ctx: &mut TxContext,
        to: Address,
        value: u128,
    ) -> Result<bool, TokenError> {
        if ctx.caller != self.minter {
            return Err(TokenError::NotMinter);
        }
        self.credit(ctx, to, value)?;
        Ok(true)
    }

    /// Unrestricted mint, only reachable from test harnesses
    pub fn mint_for_testing(
        &mut self,
        ctx: &mut TxContext,
        to: Address,
        value: u128,
    ) -> Result<(), TokenError> {
        self.credit(ctx, to, value)
    }

    fn credit(&mut self, ctx: &mut TxContext, to: Address, value: u128) -> Result<(), TokenError> {
        self.total_supply = self
            .total_supply
            .checked_add(value)
            .ok_or(TokenError::Overflow)?;
        let credited = self.balance_of(&to) + value;
        self.balances.insert(to, credited);
        ctx.emit(Event::Transfer {
            from: Address::ZERO,
            to,
            value,
        });
        Ok(())
    }
}

// ============ Tests ============
