use std::collections::HashMap;
use std::fmt::Display;

use once_cell::sync::Lazy;

use crate::location::Location;

/// Every kind of token the lexer can produce. `Indent`, `Outdent` and
/// `Newline` are virtual tokens synthesized from the layout of the source;
/// they never correspond to a literal lexeme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    None,

    // virtual layout tokens
    Comment,
    Newline,
    Indent,
    Outdent,

    // references
    Identifier,

    // literals
    AtomLiteral,
    CharLiteral,
    FloatLiteral,
    IntegerLiteral,
    StringLiteral,
    Version,
    Nil,
    True,
    False,

    // structural
    LParen,
    RParen,
    Comma,
    LCurly,
    RCurly,
    LSquare,
    RSquare,
    Colon,
    Semicolon,

    // keywords
    Def,
    Var,
    Return,
    Any,
    Type,
    Tag,
    GetTypeid,
    Sizeof,
    Is,
    Has,
    Matches,
    Pass,
    If,
    Elif,
    Else,
    While,
    For,
    Continue,
    Break,
    When,
    In,
    Or,
    And,
    Not,
    Module,
    Link,
    To,
    As,

    // operators
    Equal,
    Inequal,
    Bang,
    Maybe,
    Lt,
    Gt,
    Lte,
    Gte,
    Assign,
    Becomes,
    Plus,
    Minus,
    Times,
    DivideBy,
    Mod,
    Dot,
    DoubleDot,

    // mutating binary operators
    PlusEq,
    MaybeEq,
    MinusEq,
    TimesEq,
    DivideByEq,
    ModEq,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use TokenKind::*;

        let name = match self {
            None => "none",
            Comment => "comment",
            Newline => "newline",
            Indent => "indent",
            Outdent => "outdent",
            Identifier => "identifier",
            AtomLiteral => "atom literal",
            CharLiteral => "char literal",
            FloatLiteral => "float literal",
            IntegerLiteral => "integer literal",
            StringLiteral => "string literal",
            Version => "version",
            Nil => "nil",
            True => "true",
            False => "false",
            LParen => "'('",
            RParen => "')'",
            Comma => "','",
            LCurly => "'{'",
            RCurly => "'}'",
            LSquare => "'['",
            RSquare => "']'",
            Colon => "':'",
            Semicolon => "';'",
            Def => "def",
            Var => "var",
            Return => "return",
            Any => "any",
            Type => "type",
            Tag => "tag",
            GetTypeid => "__get_typeid__",
            Sizeof => "sizeof",
            Is => "is",
            Has => "has",
            Matches => "matches",
            Pass => "pass",
            If => "if",
            Elif => "elif",
            Else => "else",
            While => "while",
            For => "for",
            Continue => "continue",
            Break => "break",
            When => "when",
            In => "in",
            Or => "or",
            And => "and",
            Not => "not",
            Module => "module",
            Link => "link",
            To => "to",
            As => "as",
            Equal => "'=='",
            Inequal => "'!='",
            Bang => "'!'",
            Maybe => "'?'",
            Lt => "'<'",
            Gt => "'>'",
            Lte => "'<='",
            Gte => "'>='",
            Assign => "'='",
            Becomes => "':='",
            Plus => "'+'",
            Minus => "'-'",
            Times => "'*'",
            DivideBy => "'/'",
            Mod => "'%'",
            Dot => "'.'",
            DoubleDot => "'..'",
            PlusEq => "'+='",
            MaybeEq => "'?='",
            MinusEq => "'-='",
            TimesEq => "'*='",
            DivideByEq => "'/='",
            ModEq => "'%='",
        };
        f.write_str(name)
    }
}

pub static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    use TokenKind::*;

    let mut keywords = HashMap::new();
    keywords.insert("def", Def);
    keywords.insert("var", Var);
    keywords.insert("if", If);
    keywords.insert("elif", Elif);
    keywords.insert("else", Else);
    keywords.insert("while", While);
    keywords.insert("for", For);
    keywords.insert("break", Break);
    keywords.insert("continue", Continue);
    keywords.insert("pass", Pass);
    keywords.insert("return", Return);
    keywords.insert("type", Type);
    keywords.insert("tag", Tag);
    keywords.insert("module", Module);
    keywords.insert("link", Link);
    keywords.insert("to", To);
    keywords.insert("as", As);
    keywords.insert("and", And);
    keywords.insert("or", Or);
    keywords.insert("not", Not);
    keywords.insert("in", In);
    keywords.insert("is", Is);
    keywords.insert("has", Has);
    keywords.insert("matches", Matches);
    keywords.insert("any", Any);
    keywords.insert("nil", Nil);
    keywords.insert("true", True);
    keywords.insert("false", False);
    keywords.insert("when", When);
    keywords.insert("sizeof", Sizeof);
    keywords.insert("__get_typeid__", GetTypeid);
    keywords
});

/// A single token: its kind, the text as written (for delimited literals the
/// payload without its delimiters), and where it came from.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub location: Location,
}

/// Token equality ignores locations, so AST comparisons are structural:
/// pretty-printing and re-parsing a module yields an equal tree.
impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.text == other.text
    }
}

impl Eq for Token {}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, location: Location) -> Self {
        Self {
            kind,
            text: text.into(),
            location,
        }
    }

    /// A placeholder for "no token here", mostly useful as the prior token
    /// at the start of a parse.
    pub fn none(location: Location) -> Self {
        Self::new(TokenKind::None, "", location)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' ({})", self.text, self.kind)
    }
}
