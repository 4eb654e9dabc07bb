//! Rules a set of consumed and created records must satisfy
//!
//! Fungible records are checked per `IssuedTokenType` group and non-fungible
//! records per linear id. Signatures are represented by the set of keys that
//! signed, so a rule such as "every input holder must sign" is a key-set check.

use std::collections::BTreeSet;

use crate::amount::Amount;
use crate::error::TokenError;
use crate::id::{PartyKey, UniqueIdentifier};
use crate::states::{FungibleToken, NonFungibleToken};
use crate::token_type::IssuedTokenType;

/// Inputs and outputs of one issued token type
#[derive(Debug)]
pub struct TokenGroup<'a> {
    pub token: IssuedTokenType,
    pub inputs: Vec<&'a FungibleToken>,
    pub outputs: Vec<&'a FungibleToken>,
}

impl TokenGroup<'_> {
    fn input_sum(&self) -> Result<Amount<IssuedTokenType>, TokenError> {
        Amount::sum_or_zero(self.inputs.iter().map(|s| s.amount().clone()), self.token.clone())
    }

    fn output_sum(&self) -> Result<Amount<IssuedTokenType>, TokenError> {
        Amount::sum_or_zero(self.outputs.iter().map(|s| s.amount().clone()), self.token.clone())
    }
}

fn fail(message: impl Into<String>) -> TokenError {
    TokenError::Verification(message.into())
}

/// Group fungible records by issued token type, in order of first appearance
pub fn group_states<'a>(inputs: &'a [FungibleToken], outputs: &'a [FungibleToken]) -> Vec<TokenGroup<'a>> {
    let mut groups: Vec<TokenGroup<'a>> = Vec::new();

    fn slot<'a, 'g>(groups: &'g mut Vec<TokenGroup<'a>>, token: &IssuedTokenType) -> &'g mut TokenGroup<'a> {
        let position = match groups.iter().position(|g| &g.token == token) {
            Some(position) => position,
            None => {
                groups.push(TokenGroup {
                    token: token.clone(),
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                });
                groups.len() - 1
            }
        };
        &mut groups[position]
    }

    for input in inputs {
        slot(&mut groups, input.issued_token_type()).inputs.push(input);
    }
    for output in outputs {
        slot(&mut groups, output.issued_token_type()).outputs.push(output);
    }
    groups
}

/// Check an issuance of fungible tokens
///
/// Every group has no inputs, at least one output, only positive outputs,
/// and is signed by its issuer.
pub fn verify_issue(
    inputs: &[FungibleToken],
    outputs: &[FungibleToken],
    signers: &[PartyKey],
) -> Result<(), TokenError> {
    let signers: BTreeSet<PartyKey> = signers.iter().copied().collect();
    let groups = group_states(inputs, outputs);
    if groups.is_empty() {
        return Err(fail("When issuing tokens, there must be output states."));
    }

    for group in &groups {
        if !group.inputs.is_empty() {
            return Err(fail("When issuing tokens, there cannot be any input states."));
        }
        if group.outputs.is_empty() {
            return Err(fail("When issuing tokens, there must be output states."));
        }
        if group.outputs.iter().any(|s| s.amount().is_zero()) {
            return Err(fail("You cannot issue tokens with a zero amount."));
        }
        if group.output_sum()?.is_zero() {
            return Err(fail("When issuing tokens an amount > ZERO must be issued."));
        }
        if !signers.contains(group.token.issuer.owning_key()) {
            return Err(fail(format!(
                "The issuer {} must be the signing party when {} is issued.",
                group.token.issuer, group.token
            )));
        }
    }
    Ok(())
}

/// Check a move of fungible tokens
///
/// Per group the inputs and outputs are both present and sum to the same
/// amount. The signers are exactly the holders of all inputs.
pub fn verify_move(
    inputs: &[FungibleToken],
    outputs: &[FungibleToken],
    signers: &[PartyKey],
) -> Result<(), TokenError> {
    let groups = group_states(inputs, outputs);
    if groups.is_empty() {
        return Err(fail("When moving tokens, there must be input states present."));
    }

    for group in &groups {
        if group.inputs.is_empty() {
            return Err(fail(format!(
                "When moving {}, there must be input states present.",
                group.token
            )));
        }
        if group.outputs.is_empty() {
            return Err(fail(format!(
                "When moving {}, there must be output states present.",
                group.token
            )));
        }
        if group.outputs.iter().any(|s| s.amount().is_zero()) {
            return Err(fail("You cannot create output token amounts with a ZERO amount."));
        }

        let input_sum = group.input_sum()?;
        let output_sum = group.output_sum()?;
        if input_sum != output_sum {
            return Err(fail(format!(
                "In move groups the amount of input tokens MUST EQUAL the amount of output tokens: {} in, {} out",
                input_sum, output_sum
            )));
        }
    }

    let holders: BTreeSet<PartyKey> = inputs.iter().map(|s| *s.holder().owning_key()).collect();
    let signers: BTreeSet<PartyKey> = signers.iter().copied().collect();
    if holders != signers {
        return Err(fail(
            "A move must be signed by ONLY ALL the holders of ALL the input tokens.",
        ));
    }
    Ok(())
}

/// Check a redemption of fungible tokens
///
/// Per group there is at least one input, at most one change output, the
/// change is strictly below the inputs, and both the issuer and every input
/// holder sign.
pub fn verify_redeem(
    inputs: &[FungibleToken],
    outputs: &[FungibleToken],
    signers: &[PartyKey],
) -> Result<(), TokenError> {
    let signers: BTreeSet<PartyKey> = signers.iter().copied().collect();
    let groups = group_states(inputs, outputs);
    if groups.is_empty() {
        return Err(fail("When redeeming tokens, there must be input states present."));
    }

    for group in &groups {
        if group.outputs.len() > 1 {
            return Err(fail("When redeeming tokens, there must be zero or one output state."));
        }
        if group.outputs.iter().any(|s| s.amount().is_zero()) {
            return Err(fail("If there is an output, it must have a value greater than zero."));
        }
        if group.inputs.is_empty() {
            return Err(fail("When redeeming tokens, there must be input states present."));
        }

        let input_sum = group.input_sum()?;
        if input_sum.is_zero() {
            return Err(fail("When redeeming tokens an amount > ZERO must be redeemed."));
        }
        if input_sum.quantity <= group.output_sum()?.quantity {
            return Err(fail("Change shouldn't exceed amount redeemed."));
        }

        if !signers.contains(group.token.issuer.owning_key()) {
            return Err(fail("The issuer must be the signing party when an amount of tokens are redeemed."));
        }
        if group.inputs.iter().any(|s| !signers.contains(s.holder().owning_key())) {
            return Err(fail("Holders of redeemed states must be the signing parties."));
        }
    }
    Ok(())
}

fn group_by_linear_id<'a>(
    inputs: &'a [NonFungibleToken],
    outputs: &'a [NonFungibleToken],
) -> Vec<(UniqueIdentifier, Vec<&'a NonFungibleToken>, Vec<&'a NonFungibleToken>)> {
    let mut groups: Vec<(UniqueIdentifier, Vec<&NonFungibleToken>, Vec<&NonFungibleToken>)> = Vec::new();
    for (state, is_input) in inputs.iter().map(|s| (s, true)).chain(outputs.iter().map(|s| (s, false))) {
        let position = match groups.iter().position(|(id, _, _)| id == state.linear_id()) {
            Some(position) => position,
            None => {
                groups.push((state.linear_id().clone(), Vec::new(), Vec::new()));
                groups.len() - 1
            }
        };
        if is_input {
            groups[position].1.push(state);
        } else {
            groups[position].2.push(state);
        }
    }
    groups
}

/// Check an issuance of non-fungible tokens: one output per linear id, no
/// inputs, signed by the issuer
pub fn verify_non_fungible_issue(
    inputs: &[NonFungibleToken],
    outputs: &[NonFungibleToken],
    signers: &[PartyKey],
) -> Result<(), TokenError> {
    if outputs.is_empty() {
        return Err(fail("When issuing non fungible tokens, there must be a single output state."));
    }
    for (linear_id, group_inputs, group_outputs) in group_by_linear_id(inputs, outputs) {
        if !group_inputs.is_empty() {
            return Err(fail("When issuing non fungible tokens, there cannot be any input states."));
        }
        let [output] = group_outputs.as_slice() else {
            return Err(fail(format!(
                "When issuing non fungible token {}, there must be a single output state.",
                linear_id
            )));
        };
        if !signers.contains(output.issuer().owning_key()) {
            return Err(fail("The issuer must be the signing party when a token is issued."));
        }
    }
    Ok(())
}

/// Check a move of non-fungible tokens: per linear id one input and one
/// output of the same issued token, signed by exactly the current holders
pub fn verify_non_fungible_move(
    inputs: &[NonFungibleToken],
    outputs: &[NonFungibleToken],
    signers: &[PartyKey],
) -> Result<(), TokenError> {
    if inputs.is_empty() {
        return Err(fail("When moving a non fungible token, there must be one input state present."));
    }
    for (linear_id, group_inputs, group_outputs) in group_by_linear_id(inputs, outputs) {
        let ([input], [output]) = (group_inputs.as_slice(), group_outputs.as_slice()) else {
            return Err(fail(format!(
                "When moving non fungible token {}, there must be one input and one output state.",
                linear_id
            )));
        };
        if input.issued_token_type() != output.issued_token_type() {
            return Err(fail(
                "When moving a token, there must be an input and corresponding output for that token.",
            ));
        }
    }

    let holders: BTreeSet<PartyKey> = inputs.iter().map(|s| *s.holder().owning_key()).collect();
    let signers: BTreeSet<PartyKey> = signers.iter().copied().collect();
    if holders != signers {
        return Err(fail(
            "The current holder must be the only signing party when a non-fungible token is moved.",
        ));
    }
    Ok(())
}

/// Check a redemption of non-fungible tokens: inputs only, signed by issuer
/// and holder
pub fn verify_non_fungible_redeem(
    inputs: &[NonFungibleToken],
    outputs: &[NonFungibleToken],
    signers: &[PartyKey],
) -> Result<(), TokenError> {
    if !outputs.is_empty() {
        return Err(fail("When redeeming an owned token, there must be no output."));
    }
    if inputs.is_empty() {
        return Err(fail("When redeeming an owned token, there must be only one input."));
    }
    for (linear_id, group_inputs, _) in group_by_linear_id(inputs, outputs) {
        let [input] = group_inputs.as_slice() else {
            return Err(fail(format!(
                "When redeeming owned token {}, there must be only one input.",
                linear_id
            )));
        };
        if !signers.contains(input.issuer().owning_key()) {
            return Err(fail("The issuer must be the signing party when an amount of tokens are redeemed."));
        }
        if !signers.contains(input.holder().owning_key()) {
            return Err(fail("Holders of redeemed states must be the signing parties."));
        }
    }
    Ok(())
}
