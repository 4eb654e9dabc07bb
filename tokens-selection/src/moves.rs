use tokens_core::amount::Amount;
use tokens_core::criteria::TokenCriteria;
use tokens_core::error::TokenError;
use tokens_core::id::{LockId, Party, StateRef};
use tokens_core::locks::TokenVault;
use tokens_core::states::{sum_token_state_and_refs, FungibleToken, StateAndRef};
use tokens_core::token_type::{IssuedTokenType, TokenType};

use crate::selector::TokenSelector;

/// Inputs to spend and outputs to create for a move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedMove {
    /// Selected records, reserved under the caller's lock id
    pub inputs: Vec<StateAndRef<FungibleToken>>,

    /// Payments to each recipient followed by change, one output per issuer
    pub outputs: Vec<FungibleToken>,
}

/// Select tokens to pay every recipient and work out the resulting outputs
///
/// Records from different issuers are never merged: a payment that spans
/// issuers becomes several outputs, and change is returned per issuer.
///
/// # Parameters
/// * `selector` - Selects and reserves the inputs
/// * `parties_and_amounts` - Recipients and what each is owed; all of one token type
/// * `change_holder` - Receives whatever the inputs cover beyond the payments
/// * `criteria` - Which records may be spent, typically the payer as holder
/// * `lock_id` - Reservation owner for the inputs
pub fn generate_move<V: TokenVault>(
    selector: &TokenSelector<V>,
    parties_and_amounts: &[(Party, Amount<TokenType>)],
    change_holder: &Party,
    criteria: &TokenCriteria,
    lock_id: &LockId,
) -> Result<GeneratedMove, TokenError> {
    let total = Amount::sum_or_throw(parties_and_amounts.iter().map(|(_, amount)| amount.clone()))?;
    if total.is_zero() {
        return Err(TokenError::InvalidQuantity("Nothing to move".to_string()));
    }

    let inputs = selector.select_tokens_any_issuer(&total, criteria, lock_id)?;
    match split_outputs(&inputs, parties_and_amounts, change_holder) {
        Ok(outputs) => {
            log::debug!(
                "{} generated move of {} from {} inputs into {} outputs",
                lock_id,
                total,
                inputs.len(),
                outputs.len()
            );
            Ok(GeneratedMove { inputs, outputs })
        }
        Err(e) => {
            // Hand back what this call reserved
            let refs: Vec<StateRef> = inputs.iter().map(|s| s.state_ref).collect();
            selector.vault().release_refs(&refs, lock_id)?;
            Err(e)
        }
    }
}

fn split_outputs(
    inputs: &[StateAndRef<FungibleToken>],
    parties_and_amounts: &[(Party, Amount<TokenType>)],
    change_holder: &Party,
) -> Result<Vec<FungibleToken>, TokenError> {
    // What is left from each issuer, in order of first appearance
    let mut remaining: Vec<Amount<IssuedTokenType>> = Vec::new();
    for input in inputs {
        let amount = input.state.amount();
        match remaining.iter_mut().find(|r| r.token == amount.token) {
            Some(entry) => *entry = entry.checked_add(amount)?,
            None => remaining.push(amount.clone()),
        }
    }
    remaining.reverse();

    let mut outputs = Vec::new();
    for (party, payment) in parties_and_amounts {
        let mut to_pay = payment.quantity;
        while to_pay > 0 {
            let current = remaining.last_mut().ok_or_else(|| TokenError::InsufficientAmount {
                available: "0".to_string(),
                required: payment.to_string(),
            })?;

            if current.quantity > to_pay {
                outputs.push(FungibleToken::new(
                    Amount::from_quantity(to_pay, current.token.clone()),
                    party.clone(),
                )?);
                current.quantity -= to_pay;
                to_pay = 0;
            } else {
                to_pay -= current.quantity;
                if let Some(exhausted) = remaining.pop() {
                    outputs.push(FungibleToken::new(exhausted, party.clone())?);
                }
            }
        }
    }

    // Change, earliest issuer first
    for change in remaining.into_iter().rev() {
        outputs.push(FungibleToken::new(change, change_holder.clone())?);
    }
    Ok(outputs)
}

/// Work out the change left when `amount` is redeemed from `exit_states`
///
/// # Returns
/// The exit states unchanged, plus a change record for `change_holder`, or
/// `None` when the states sum exactly to `amount`
pub fn generate_exit(
    exit_states: Vec<StateAndRef<FungibleToken>>,
    amount: &Amount<TokenType>,
    change_holder: &Party,
) -> Result<(Vec<StateAndRef<FungibleToken>>, Option<FungibleToken>), TokenError> {
    let first_issuer = exit_states
        .first()
        .map(|s| s.state.issuer().clone())
        .ok_or_else(|| TokenError::Other("Exiting empty list of states".to_string()))?;

    if let Some(other) = exit_states.iter().find(|s| s.state.issuer() != &first_issuer) {
        return Err(TokenError::TypeMismatch {
            left: first_issuer.to_string(),
            right: other.state.issuer().to_string(),
        });
    }

    let sum = sum_token_state_and_refs(&exit_states)?
        .ok_or_else(|| TokenError::Other("Exiting empty list of states".to_string()))?;
    let difference = sum.checked_sub(&amount.issued_by(&first_issuer))?;

    let change = if difference.is_zero() {
        None
    } else {
        Some(difference.held_by(change_holder)?)
    };
    Ok((exit_states, change))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectionConfig;
    use crate::memory::InMemoryTokenVault;
    use std::sync::Arc;
    use tokens_core::verify::{verify_move, verify_redeem};

    fn gbp() -> TokenType {
        TokenType::new("GBP", 2)
    }

    fn pounds(value: i64) -> Amount<TokenType> {
        Amount::from_int(value, gbp()).unwrap()
    }

    fn state(issuer: &Party, holder: &Party, seed: &[u8], value: i64) -> StateAndRef<FungibleToken> {
        StateAndRef::new(
            pounds(value).issued_by(issuer).held_by(holder).unwrap(),
            StateRef::from_seeds(&[seed], 0),
        )
    }

    fn selector_with(states: &[StateAndRef<FungibleToken>]) -> TokenSelector<InMemoryTokenVault> {
        let vault = InMemoryTokenVault::new();
        vault.add_tokens(states).unwrap();
        TokenSelector::new(Arc::new(vault), SelectionConfig::default()).unwrap()
    }

    fn total_for(outputs: &[FungibleToken], holder: &Party) -> u128 {
        outputs
            .iter()
            .filter(|o| o.holder() == holder)
            .map(|o| o.amount().quantity)
            .sum()
    }

    #[test]
    fn test_move_with_change() {
        let bank = Party::named("O=Bank");
        let alice = Party::named("O=Alice");
        let bob = Party::named("O=Bob");
        let selector = selector_with(&[state(&bank, &alice, b"a", 10), state(&bank, &alice, b"b", 10)]);

        let lock = LockId::random();
        let criteria = TokenCriteria::by_token_type_and_holder(gbp(), &alice);
        let generated = generate_move(&selector, &[(bob.clone(), pounds(15))], &alice, &criteria, &lock).unwrap();

        assert_eq!(generated.inputs.len(), 2);
        assert_eq!(total_for(&generated.outputs, &bob), 1_500);
        assert_eq!(total_for(&generated.outputs, &alice), 500);
        assert_eq!(selector.vault().reservations(&lock).unwrap().len(), 2);

        let inputs: Vec<FungibleToken> = generated.inputs.iter().map(|s| s.state.clone()).collect();
        verify_move(&inputs, &generated.outputs, &[*alice.owning_key()]).unwrap();
    }

    #[test]
    fn test_move_keeps_issuers_apart() {
        let bank = Party::named("O=Bank");
        let other = Party::named("O=OtherBank");
        let alice = Party::named("O=Alice");
        let bob = Party::named("O=Bob");
        let carol = Party::named("O=Carol");
        let selector = selector_with(&[state(&bank, &alice, b"a", 10), state(&other, &alice, b"b", 10)]);

        let criteria = TokenCriteria::by_token_type_and_holder(gbp(), &alice);
        let generated = generate_move(
            &selector,
            &[(bob.clone(), pounds(12)), (carol.clone(), pounds(8))],
            &alice,
            &criteria,
            &LockId::random(),
        )
        .unwrap();

        // Bob's payment spans both issuers; nothing is left for change
        assert_eq!(total_for(&generated.outputs, &bob), 1_200);
        assert_eq!(total_for(&generated.outputs, &carol), 800);
        assert_eq!(total_for(&generated.outputs, &alice), 0);
        assert_eq!(generated.outputs.iter().filter(|o| o.holder() == &bob).count(), 2);
        for output in &generated.outputs {
            assert!(output.issuer() == &bank || output.issuer() == &other);
        }

        let inputs: Vec<FungibleToken> = generated.inputs.iter().map(|s| s.state.clone()).collect();
        verify_move(&inputs, &generated.outputs, &[*alice.owning_key()]).unwrap();
    }

    #[test]
    fn test_move_insufficient() {
        let bank = Party::named("O=Bank");
        let alice = Party::named("O=Alice");
        let selector = selector_with(&[state(&bank, &alice, b"a", 10)]);
        let criteria = TokenCriteria::by_token_type_and_holder(gbp(), &alice);
        let result = generate_move(&selector, &[(Party::named("O=Bob"), pounds(20))], &alice, &criteria, &LockId::random());
        assert!(matches!(result, Err(TokenError::InsufficientBalance(_))));
    }

    #[test]
    fn test_move_rejects_mixed_token_types() {
        let alice = Party::named("O=Alice");
        let selector = selector_with(&[]);
        let usd = Amount::from_int(1, TokenType::new("USD", 2)).unwrap();
        let criteria = TokenCriteria::by_token_type(gbp());
        let result = generate_move(
            &selector,
            &[(alice.clone(), pounds(1)), (alice.clone(), usd)],
            &alice,
            &criteria,
            &LockId::random(),
        );
        assert!(matches!(result, Err(TokenError::TypeMismatch { .. })));
    }

    #[test]
    fn test_exit_with_and_without_change() {
        let bank = Party::named("O=Bank");
        let alice = Party::named("O=Alice");
        let states = vec![state(&bank, &alice, b"a", 10), state(&bank, &alice, b"b", 5)];

        let (inputs, change) = generate_exit(states.clone(), &pounds(12), &alice).unwrap();
        assert_eq!(inputs.len(), 2);
        let change = change.unwrap();
        assert_eq!(change.amount().quantity, 300);
        assert_eq!(change.holder(), &alice);

        let redeemed: Vec<FungibleToken> = inputs.iter().map(|s| s.state.clone()).collect();
        let signers = [*bank.owning_key(), *alice.owning_key()];
        verify_redeem(&redeemed, &[change.clone()], &signers).unwrap();

        let (_, change) = generate_exit(states.clone(), &pounds(15), &alice).unwrap();
        assert!(change.is_none());
        verify_redeem(&redeemed, &[], &signers).unwrap();

        let result = generate_exit(states, &pounds(16), &alice);
        assert!(matches!(result, Err(TokenError::InsufficientAmount { .. })));
    }

    #[test]
    fn test_exit_rejects_mixed_issuers_and_empty() {
        let alice = Party::named("O=Alice");
        let states = vec![
            state(&Party::named("O=Bank"), &alice, b"a", 10),
            state(&Party::named("O=OtherBank"), &alice, b"b", 10),
        ];
        assert!(matches!(
            generate_exit(states, &pounds(5), &alice),
            Err(TokenError::TypeMismatch { .. })
        ));
        assert!(generate_exit(Vec::new(), &pounds(5), &alice).is_err());
    }
}
