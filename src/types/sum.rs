use std::collections::BTreeSet;
use std::rc::Rc;

use log::trace;

use crate::location::Location;

use super::unification::unify;
use super::{type_maybe, Type, TypeEnv, TypeRef};

/// The canonical sum builder. Flattens nested sums, lifts `nil` options into
/// an outer maybe, deduplicates by signature, and removes options already
/// accepted by the rest of the sum.
pub fn type_sum_safe(
    options: Vec<TypeRef>,
    location: Location,
    env: &TypeEnv,
) -> Result<TypeRef, String> {
    let mut has_nil = false;
    let mut flattened: Vec<TypeRef> = vec![];
    flatten_options(options, &mut flattened, &mut has_nil);

    // dedup by signature, keeping first occurrence order
    let mut seen = BTreeSet::new();
    let mut unique: Vec<TypeRef> = vec![];
    for option in flattened {
        if seen.insert(option.signature()) {
            unique.push(option);
        }
    }

    // subsumption elimination: drop an option if the sum without it already
    // accepts it
    let mut index = 0;
    while unique.len() > 1 && index < unique.len() {
        let candidate = unique[index].clone();
        let rest: Vec<TypeRef> = unique
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, option)| option.clone())
            .collect();
        let rest_sum = make_sum(rest, location.clone());

        if unify(&rest_sum, &candidate, env).result {
            trace!("sum option {candidate} is subsumed by the rest of the sum");
            unique.remove(index);
        } else {
            index += 1;
        }
    }

    let sum = match unique.len() {
        0 => {
            if has_nil {
                return Ok(super::type_nil());
            }
            return Err("sum type with no options".to_string());
        }
        1 => unique.into_iter().next().unwrap(),
        _ => make_sum(unique, location),
    };

    if has_nil {
        Ok(type_maybe(sum))
    } else {
        Ok(sum)
    }
}

fn flatten_options(options: Vec<TypeRef>, out: &mut Vec<TypeRef>, has_nil: &mut bool) {
    for option in options {
        match option.as_ref() {
            Type::Sum {
                options: nested, ..
            } => flatten_options(nested.clone(), out, has_nil),
            Type::Maybe { just } => {
                *has_nil = true;
                flatten_options(vec![just.clone()], out, has_nil);
            }
            _ if option.is_nil() => *has_nil = true,
            _ => out.push(option),
        }
    }
}

fn make_sum(options: Vec<TypeRef>, location: Location) -> TypeRef {
    if options.len() == 1 {
        return options.into_iter().next().unwrap();
    }
    Rc::new(Type::Sum { options, location })
}

#[cfg(test)]
mod tests {
    use super::super::*;
    use super::*;

    fn loc() -> Location {
        Location::builtin()
    }

    #[test]
    fn test_sum_flattens_nested_sums() {
        let inner = Rc::new(Type::Sum {
            options: vec![type_id("a", loc()), type_id("b", loc())],
            location: loc(),
        });
        let sum = type_sum_safe(
            vec![inner, type_id("c", loc())],
            loc(),
            &TypeEnv::default(),
        )
        .unwrap();

        assert_eq!("(or a b c)", sum.signature());
    }

    #[test]
    fn test_sum_lifts_nil_into_maybe() {
        let sum = type_sum_safe(
            vec![type_id("a", loc()), type_nil(), type_id("b", loc())],
            loc(),
            &TypeEnv::default(),
        )
        .unwrap();

        assert_eq!("(or a b)?", sum.signature());
    }

    #[test]
    fn test_sum_deduplicates_by_signature() {
        let sum = type_sum_safe(
            vec![type_id("a", loc()), type_id("a", loc()), type_id("b", loc())],
            loc(),
            &TypeEnv::default(),
        )
        .unwrap();

        assert_eq!("(or a b)", sum.signature());
    }

    #[test]
    fn test_single_option_collapses() {
        let sum = type_sum_safe(
            vec![type_id("a", loc()), type_id("a", loc())],
            loc(),
            &TypeEnv::default(),
        )
        .unwrap();

        assert_eq!("a", sum.signature());
    }

    #[test]
    fn test_nil_only_sum_is_nil() {
        let sum = type_sum_safe(vec![type_nil()], loc(), &TypeEnv::default()).unwrap();

        assert_eq!("nil", sum.signature());
    }

    #[test]
    fn test_maybe_option_is_absorbed() {
        let sum = type_sum_safe(
            vec![type_maybe(type_id("a", loc())), type_id("b", loc())],
            loc(),
            &TypeEnv::default(),
        )
        .unwrap();

        assert_eq!("(or a b)?", sum.signature());
    }

    #[test]
    fn test_empty_sum_is_an_error() {
        assert!(type_sum_safe(vec![], loc(), &TypeEnv::default()).is_err());
    }
}
