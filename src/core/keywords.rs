//! Keyword spellings, reserved words and the special-method alias table.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

use crate::core::token::TokenKind;

/// Every accepted spelling of every keyword. Constructs with several
/// spellings share a `TokenKind`; the parser uses the lexeme to notice when a
/// file mixes them.
static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    use TokenKind::*;
    HashMap::from([
        ("var", Var),
        ("variable", Variable),
        ("func", Func),
        ("definir", Func),
        ("metodo", Method),
        ("atributo", Attribute),
        ("si", If),
        ("sino", Else),
        ("mientras", While),
        ("para", For),
        ("in", In),
        ("en", In),
        ("import", Import),
        ("usar", Use),
        ("macro", Macro),
        ("hilo", Thread),
        ("asincronico", Async),
        ("switch", Switch),
        ("segun", Switch),
        ("case", Case),
        ("caso", Case),
        ("clase", Class),
        ("estructura", Class),
        ("registro", Class),
        ("enum", Enum),
        ("enumeracion", Enum),
        ("interface", Interface),
        ("interfaz", Interface),
        ("try", Try),
        ("intentar", Try),
        ("catch", Catch),
        ("capturar", Catch),
        ("throw", Throw),
        ("lanzar", Throw),
        ("finally", Finally),
        ("finalmente", Finally),
        ("imprimir", Print),
        ("yield", Yield),
        ("esperar", Await),
        ("romper", Break),
        ("continuar", Continue),
        ("pasar", Pass),
        ("afirmar", Assert),
        ("eliminar", Del),
        ("global", Global),
        ("nolocal", NonLocal),
        ("lambda", Lambda),
        ("con", With),
        ("with", With),
        ("como", As),
        ("as", As),
        ("desde", From),
        ("fin", End),
        ("retorno", Return),
        ("garantia", Guard),
        ("guard", Guard),
        ("defer", Defer),
        ("aplazar", Defer),
        ("option", Option),
        ("holobit", Holobit),
        ("export", Export),
        ("exportar", Export),
        ("lista", List),
        ("diccionario", Dict),
        ("y", AndAnd),
        ("and", AndAnd),
        ("o", OrOr),
        ("or", OrOr),
        ("no", Bang),
        ("not", Bang),
        ("verdadero", Boolean(true)),
        ("true", Boolean(true)),
        ("falso", Boolean(false)),
        ("false", Boolean(false)),
        ("nulo", Null),
        ("null", Null),
    ])
});

/// User-facing method names and the special method each one produces.
pub const SPECIAL_METHOD_ALIASES: &[(&str, &str)] = &[
    ("asignar_atributo", "__setattr__"),
    ("borrar_atributo", "__delattr__"),
    ("borrar_item", "__delitem__"),
    ("booleano", "__bool__"),
    ("comparar", "__eq__"),
    ("contener", "__contains__"),
    ("entrar", "__enter__"),
    ("entrar_async", "__aenter__"),
    ("inicializar", "__init__"),
    ("iterar", "__iter__"),
    ("llamar", "__call__"),
    ("longitud", "__len__"),
    ("obtener_atributo", "__getattr__"),
    ("obtener_hash", "__hash__"),
    ("obtener_item", "__getitem__"),
    ("ordenar", "__lt__"),
    ("poner_item", "__setitem__"),
    ("representar", "__repr__"),
    ("salir", "__exit__"),
    ("salir_async", "__aexit__"),
    ("texto", "__str__"),
];

static RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| KEYWORDS.keys().copied().collect());

pub fn lookup(word: &str) -> Option<TokenKind> {
    KEYWORDS.get(word).cloned()
}

pub fn is_reserved(word: &str) -> bool {
    RESERVED.contains(word)
}

/// Maps a method name through the alias table. Names that are not aliases
/// come back unchanged.
pub fn normalize_method_name(name: &str) -> &str {
    SPECIAL_METHOD_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, target)| *target)
        .unwrap_or(name)
}

/// Closest keyword to `word` when the similarity ratio reaches 0.8.
pub fn suggest_keyword(word: &str) -> Option<&'static str> {
    if is_reserved(word) {
        return None;
    }
    let mut best: Option<(&'static str, f64)> = None;
    for kw in KEYWORDS.keys() {
        let r = similarity(word, kw);
        if r >= 0.8 && best.map_or(true, |(b, s)| r > s || (r == s && *kw < b)) {
            best = Some((kw, r));
        }
    }
    best.map(|(kw, _)| kw)
}

/// `2 * lcs / (|a| + |b|)` over chars.
fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    for ca in &a {
        let mut cur = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb { prev[j] + 1 } else { cur[j].max(prev[j + 1]) };
        }
        prev = cur;
    }
    2.0 * prev[b.len()] as f64 / (a.len() + b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_share_kind() {
        assert_eq!(lookup("clase"), lookup("estructura"));
        assert_eq!(lookup("func"), lookup("definir"));
        assert_eq!(lookup("cualquiera"), None);
    }

    #[test]
    fn special_names_normalize() {
        assert_eq!(normalize_method_name("inicializar"), "__init__");
        assert_eq!(normalize_method_name("texto"), "__str__");
        assert_eq!(normalize_method_name("sumar"), "sumar");
    }

    #[test]
    fn suggestion_for_typo() {
        assert_eq!(suggest_keyword("imprimr"), Some("imprimir"));
        assert_eq!(suggest_keyword("zzz"), None);
        assert_eq!(suggest_keyword("mientras"), None);
    }
}
