use std::rc::Rc;

use crate::location::Location;

use super::{
    type_args, type_function, type_id, type_integer, type_lambda, type_managed, type_maybe,
    type_module, type_operator, type_ptr, type_ref_to, type_struct, type_variable, NameIndex,
    Type, TypeRef,
};

/// Parse a canonical type signature back into a type value. Signatures are
/// the authoritative structural identity, so for every type `t`,
/// `parse_signature(t.signature())` yields a type with the same signature.
pub fn parse_signature(input: &str) -> Option<TypeRef> {
    let mut cursor = Cursor {
        text: input,
        pos: 0,
    };
    let type_ = cursor.parse_type()?;
    cursor.skip_spaces();
    if cursor.pos != cursor.text.len() {
        return None;
    }
    Some(type_)
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '/'
}

impl Cursor<'_> {
    fn rest(&self) -> &str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_spaces(&mut self) {
        while self.rest().starts_with(' ') {
            self.pos += 1;
        }
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.rest().starts_with(prefix) {
            self.pos += prefix.len();
            return true;
        }
        false
    }

    fn word(&mut self) -> &str {
        let start = self.pos;
        while self.peek().is_some_and(is_name_char) {
            self.pos += self.peek().map(char::len_utf8).unwrap_or(0);
        }
        &self.text[start..self.pos]
    }

    fn parse_type(&mut self) -> Option<TypeRef> {
        let mut type_ = self.parse_prefixed()?;

        loop {
            if self.eat("?") {
                type_ = type_maybe(type_);
            } else if self.peek() == Some('{') {
                self.pos += 1;
                let operand = self.parse_type()?;
                if !self.eat("}") {
                    return None;
                }
                type_ = type_operator(type_, operand);
            } else {
                return Some(type_);
            }
        }
    }

    fn parse_prefixed(&mut self) -> Option<TypeRef> {
        self.skip_spaces();

        if self.eat("*") {
            return Some(type_ptr(self.parse_prefixed()?));
        }
        if self.eat("&") {
            return Some(type_ref_to(self.parse_prefixed()?));
        }
        if self.eat("any ") {
            let name = self.word().to_string();
            if name.is_empty() {
                return None;
            }
            return Some(type_variable(name, Location::builtin()));
        }
        if self.eat("managed{") {
            let element = self.parse_type()?;
            if !self.eat("}") {
                return None;
            }
            return Some(type_managed(element));
        }
        if self.eat("module{") {
            let inner = self.parse_type()?;
            if !self.eat("}") {
                return None;
            }
            return Some(type_module(inner));
        }
        if self.eat("struct{") {
            let (dimensions, name_index) = self.parse_dimensions()?;
            return Some(type_struct(dimensions, name_index));
        }
        if self.eat("args{") {
            let (dimensions, name_index) = self.parse_dimensions()?;
            return Some(type_args(dimensions, name_index));
        }
        if self.eat("def ") {
            let args = self.parse_prefixed()?;
            self.skip_spaces();
            let return_type = self.parse_type()?;
            return Some(type_function(args, return_type));
        }
        if self.eat("(or") {
            let mut options = vec![];
            loop {
                self.skip_spaces();
                if self.eat(")") {
                    break;
                }
                options.push(self.parse_type()?);
            }
            if options.is_empty() {
                return None;
            }
            return Some(Rc::new(Type::Sum {
                options,
                location: Location::builtin(),
            }));
        }
        if self.eat("(lambda ") {
            let binding = self.word().to_string();
            self.skip_spaces();
            let body = self.parse_type()?;
            if !self.eat(")") {
                return None;
            }
            return Some(type_lambda(binding, body));
        }

        let name = self.word().to_string();
        if name.is_empty() {
            return None;
        }
        if let Some(integer) = parse_integer_name(&name) {
            return Some(integer);
        }
        Some(type_id(name, Location::builtin()))
    }

    /// Dimensions are `[name ] type` separated by commas, closed by `}`.
    fn parse_dimensions(&mut self) -> Option<(Vec<TypeRef>, NameIndex)> {
        let mut dimensions = vec![];
        let mut name_index = NameIndex::new();

        self.skip_spaces();
        if self.eat("}") {
            return Some((dimensions, name_index));
        }

        loop {
            self.skip_spaces();

            // a leading word followed by a space names the dimension,
            // unless it is immediately applied with '{'
            let saved = self.pos;
            let mut name = None;
            if self.peek().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
                let word = self.word().to_string();
                if self.peek() == Some(' ') && parse_integer_name(&word).is_none() {
                    name = Some(word);
                } else {
                    self.pos = saved;
                }
            }

            let dimension = self.parse_type()?;
            if let Some(name) = name {
                name_index.insert(name, dimensions.len());
            }
            dimensions.push(dimension);

            self.skip_spaces();
            if self.eat(",") {
                continue;
            }
            if self.eat("}") {
                return Some((dimensions, name_index));
            }
            return None;
        }
    }
}

fn parse_integer_name(name: &str) -> Option<TypeRef> {
    let (signed, bits_text) = match name.strip_prefix("uint") {
        Some(bits) => (false, bits),
        None => (true, name.strip_prefix("int")?),
    };
    match bits_text {
        "1" | "8" | "16" | "32" | "64" => {
            let bits = bits_text.parse().ok()?;
            Some(type_integer(bits, signed))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::*;
    use super::*;

    fn loc() -> Location {
        Location::builtin()
    }

    fn round_trip(type_: &TypeRef) {
        let signature = type_.signature();
        let parsed = parse_signature(&signature)
            .unwrap_or_else(|| panic!("signature '{signature}' failed to parse"));
        assert_eq!(signature, parsed.signature());
    }

    #[test]
    fn test_round_trip_simple_types() {
        round_trip(&type_id("str", loc()));
        round_trip(&type_integer(64, true));
        round_trip(&type_integer(8, false));
        round_trip(&type_variable("T", loc()));
    }

    #[test]
    fn test_round_trip_composites() {
        round_trip(&type_maybe(type_id("str", loc())));
        round_trip(&type_ptr(type_managed(type_struct(
            vec![type_integer(64, true), type_id("str", loc())],
            NameIndex::from([("x".to_string(), 0), ("label".to_string(), 1)]),
        ))));
        round_trip(&type_operator(
            type_id("vector.vector", loc()),
            type_integer(64, true),
        ));
    }

    #[test]
    fn test_round_trip_function_type() {
        round_trip(&type_function(
            type_args(
                vec![type_integer(64, true), type_id("str", loc())],
                NameIndex::new(),
            ),
            type_id("bool", loc()),
        ));
    }

    #[test]
    fn test_round_trip_sum_and_lambda() {
        let sum = Rc::new(Type::Sum {
            options: vec![
                type_id("m.Circle", loc()),
                type_id("m.Square", loc()),
            ],
            location: loc(),
        });
        round_trip(&type_maybe(sum));

        round_trip(&type_lambda(
            "T",
            type_ptr(type_managed(type_struct(
                vec![type_variable("T", loc())],
                NameIndex::new(),
            ))),
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse_signature("").is_none());
        assert!(parse_signature("{int64").is_none());
        assert!(parse_signature("(or)").is_none());
    }
}
