//! Valeur polymorphe et table d'opérations par variante.

use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    class::{Instance, ScriptClass},
    collections,
    error::{RResult, RuntimeError},
    function::{Closure, MemberFunction, NativeFunction, ScriptFunction},
};

/// Tableau partagé par référence.
pub type ArrayRef = Rc<RefCell<Vec<Object>>>;
/// Map partagée par référence (ordre d'insertion conservé).
pub type MapRef = Rc<RefCell<IndexMap<String, Object>>>;

/// Valeur Trèfle. Ensemble de variantes fermé.
#[derive(Clone, Default)]
pub enum Object {
    /// Entier 64 bits.
    Integer(i64),
    /// Flottant 64 bits.
    Float(f64),
    /// Chaîne immuable.
    String(Rc<str>),
    /// Booléen.
    Boolean(bool),
    /// `null`
    #[default]
    Null,
    /// Tableau mutable partagé.
    Array(ArrayRef),
    /// Map mutable partagée.
    Map(MapRef),
    /// Gabarit de fonction (jamais exécuté directement).
    ScriptFunction(Rc<ScriptFunction>),
    /// Fonction + valeurs par défaut + variables capturées.
    Closure(Rc<Closure>),
    /// Fonction fournie par l'hôte.
    NativeFunction(Rc<NativeFunction>),
    /// Closure liée à une instance.
    MemberFunction(Rc<MemberFunction>),
    /// Classe.
    Class(Rc<ScriptClass>),
    /// Instance de classe.
    Instance(Rc<Instance>),
}

impl Object {
    /// Chaîne depuis n'importe quoi de convertible.
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Rc::from(s.as_ref()))
    }

    /// Nouveau tableau.
    pub fn array(items: Vec<Self>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    /// Nouvelle map.
    pub fn map(entries: IndexMap<String, Self>) -> Self {
        Self::Map(Rc::new(RefCell::new(entries)))
    }

    /// Nom du type, utilisé dans les messages d'erreur.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::String(_) => "String",
            Self::Boolean(_) => "Boolean",
            Self::Null => "Null",
            Self::Array(_) => "Array",
            Self::Map(_) => "Map",
            Self::ScriptFunction(_) => "ScriptFunction",
            Self::Closure(_) => "Closure",
            Self::NativeFunction(_) => "NativeFunction",
            Self::MemberFunction(_) => "MemberFunction",
            Self::Class(_) => "Class",
            Self::Instance(_) => "Instance",
        }
    }

    /// Vrai pour `null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn unsupported(&self, op: &'static str, rhs: &Self) -> RuntimeError {
        RuntimeError::Unsupported { op, left: self.kind(), right: rhs.kind() }
    }

    /* ─────────── Arithmétique ─────────── */

    /// `self + rhs` ; une chaîne d'un côté concatène les formes texte.
    pub fn add(&self, rhs: &Self) -> RResult<Self> {
        use Object::{Integer, String};
        match (self, rhs) {
            (Integer(a), Integer(b)) => a.checked_add(*b).map(Integer).ok_or(RuntimeError::Overflow("add")),
            (String(_), _) | (_, String(_)) => Ok(Self::string(format!("{self}{rhs}"))),
            _ => self.numeric(rhs, "add", |a, b| a + b),
        }
    }

    /// `self - rhs`
    pub fn sub(&self, rhs: &Self) -> RResult<Self> {
        match (self, rhs) {
            (Self::Integer(a), Self::Integer(b)) => {
                a.checked_sub(*b).map(Self::Integer).ok_or(RuntimeError::Overflow("sub"))
            },
            _ => self.numeric(rhs, "sub", |a, b| a - b),
        }
    }

    /// `self * rhs`
    pub fn mul(&self, rhs: &Self) -> RResult<Self> {
        match (self, rhs) {
            (Self::Integer(a), Self::Integer(b)) => {
                a.checked_mul(*b).map(Self::Integer).ok_or(RuntimeError::Overflow("multiply"))
            },
            _ => self.numeric(rhs, "multiply", |a, b| a * b),
        }
    }

    /// `self / rhs` ; division entière pour deux entiers.
    pub fn div(&self, rhs: &Self) -> RResult<Self> {
        match (self, rhs) {
            (Self::Integer(_), Self::Integer(0)) => Err(RuntimeError::DivisionByZero),
            (Self::Integer(a), Self::Integer(b)) => {
                a.checked_div(*b).map(Self::Integer).ok_or(RuntimeError::Overflow("divide"))
            },
            _ => self.numeric(rhs, "divide", |a, b| a / b),
        }
    }

    /// Contagion flottante : Integer op Float → Float.
    #[allow(clippy::cast_precision_loss)]
    fn numeric(&self, rhs: &Self, op: &'static str, f: impl Fn(f64, f64) -> f64) -> RResult<Self> {
        let (a, b) = match (self, rhs) {
            (Self::Float(a), Self::Float(b)) => (*a, *b),
            (Self::Integer(a), Self::Float(b)) => (*a as f64, *b),
            (Self::Float(a), Self::Integer(b)) => (*a, *b as f64),
            _ => return Err(self.unsupported(op, rhs)),
        };
        Ok(Self::Float(f(a, b)))
    }

    /* ─────────── Comparaisons ─────────── */

    /// Égalité : par valeur pour les primitifs, par identité sinon.
    pub fn equals(&self, rhs: &Self) -> bool {
        match (self, rhs) {
            (Self::Integer(a), Self::Integer(b)) => a == b,
            #[allow(clippy::float_cmp)]
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Null, Self::Null) => true,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Map(a), Self::Map(b)) => Rc::ptr_eq(a, b),
            (Self::ScriptFunction(a), Self::ScriptFunction(b)) => Rc::ptr_eq(a, b),
            (Self::Closure(a), Self::Closure(b)) => Rc::ptr_eq(a, b),
            (Self::NativeFunction(a), Self::NativeFunction(b)) => Rc::ptr_eq(a, b),
            (Self::MemberFunction(a), Self::MemberFunction(b)) => Rc::ptr_eq(a, b),
            (Self::Class(a), Self::Class(b)) => Rc::ptr_eq(a, b),
            (Self::Instance(a), Self::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Égalité structurelle stricte utilisée pour dédupliquer les constantes
    /// (`1` et `1.0` restent distincts, `-0.0` et `0.0` aussi).
    pub fn same_constant(&self, rhs: &Self) -> bool {
        match (self, rhs) {
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Integer(_) | Self::String(_) | Self::Boolean(_) | Self::Null, _) => self.equals(rhs),
            _ => false,
        }
    }

    /// `==`
    pub fn equal(&self, rhs: &Self) -> RResult<Self> {
        Ok(Self::Boolean(self.equals(rhs)))
    }

    /// `!=`
    pub fn not_equal(&self, rhs: &Self) -> RResult<Self> {
        Ok(Self::Boolean(!self.equals(rhs)))
    }

    #[allow(clippy::cast_precision_loss)]
    fn compare(&self, rhs: &Self) -> RResult<std::cmp::Ordering> {
        let ordering = match (self, rhs) {
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            _ => return Err(self.unsupported("compare", rhs)),
        };
        // NaN : aucune relation d'ordre
        ordering.ok_or_else(|| self.unsupported("compare", rhs))
    }

    /// `<`
    pub fn less(&self, rhs: &Self) -> RResult<Self> {
        Ok(Self::Boolean(self.compare(rhs)?.is_lt()))
    }

    /// `>`
    pub fn greater(&self, rhs: &Self) -> RResult<Self> {
        Ok(Self::Boolean(self.compare(rhs)?.is_gt()))
    }

    /// `<=`
    pub fn less_equal(&self, rhs: &Self) -> RResult<Self> {
        Ok(Self::Boolean(self.compare(rhs)?.is_le()))
    }

    /// `>=`
    pub fn greater_equal(&self, rhs: &Self) -> RResult<Self> {
        Ok(Self::Boolean(self.compare(rhs)?.is_ge()))
    }

    /* ─────────── Booléens / unaires ─────────── */

    /// Conversion en condition.
    pub fn as_boolean(&self) -> RResult<bool> {
        match self {
            Self::Boolean(b) => Ok(*b),
            Self::String(s) => Ok(!s.is_empty()),
            Self::Float(f) => Ok(*f != 0.0),
            Self::Integer(i) => Ok(*i != 0),
            Self::Null => Ok(false),
            other => Err(RuntimeError::NotBoolean(other.kind())),
        }
    }

    /// `and` sur deux valeurs évaluées (le compilateur court-circuite en amont).
    pub fn and(&self, rhs: &Self) -> RResult<Self> {
        Ok(Self::Boolean(self.as_boolean()? && rhs.as_boolean()?))
    }

    /// `or` sur deux valeurs évaluées.
    pub fn or(&self, rhs: &Self) -> RResult<Self> {
        Ok(Self::Boolean(self.as_boolean()? || rhs.as_boolean()?))
    }

    /// `-x`
    pub fn negate(&self) -> RResult<Self> {
        match self {
            Self::Integer(i) => i.checked_neg().map(Self::Integer).ok_or(RuntimeError::Overflow("negate")),
            Self::Float(f) => Ok(Self::Float(-f)),
            other => Err(RuntimeError::UnsupportedUnary { op: "-", kind: other.kind() }),
        }
    }

    /// `not x`
    pub fn not(&self) -> RResult<Self> {
        Ok(Self::Boolean(!self.as_boolean()?))
    }

    /// Forme texte sous forme de valeur `String`.
    #[allow(clippy::unnecessary_wraps)]
    pub fn to_display(&self) -> RResult<Self> {
        Ok(Self::string(self.to_string()))
    }

    /* ─────────── Accès membres ─────────── */

    /// `self[key]` / `self.key`.
    ///
    /// `Ok(None)` signifie « membre absent » ; la VM en fait une erreur.
    /// Tableaux et maps renvoient `null` pour un index ou une clé absents.
    pub fn get_member(&self, key: &Self) -> RResult<Option<Self>> {
        let found = match (self, key) {
            (Self::Array(items), Self::Integer(index)) => {
                let items = items.borrow();
                let value = usize::try_from(*index).ok().and_then(|i| items.get(i).cloned());
                return Ok(Some(value.unwrap_or_default()));
            },
            (Self::Array(items), Self::String(name)) => collections::array_method(items, name),
            (Self::Map(entries), Self::String(name)) => {
                if let Some(value) = entries.borrow().get(&**name) {
                    return Ok(Some(value.clone()));
                }
                return Ok(Some(collections::map_method(entries, name).unwrap_or_default()));
            },
            (Self::Instance(instance), Self::String(name)) => Instance::get(instance, name),
            (Self::Class(class), Self::String(name)) => ScriptClass::get(class, name),
            (Self::Array(_) | Self::Map(_) | Self::Instance(_) | Self::Class(_), _) => {
                return Err(RuntimeError::KeyType { target: self.kind(), key: key.kind() });
            },
            (_, Self::String(_)) => None,
            _ => return Err(RuntimeError::KeyType { target: self.kind(), key: key.kind() }),
        };
        Ok(found.or_else(|| match key {
            Self::String(name) if &**name == "to_string" => Some(collections::to_string_method(self)),
            _ => None,
        }))
    }

    /// `self[key] = value`. Sur une instance, écrit toujours dans la table d'instance.
    pub fn set_member(&self, key: &Self, value: Self) -> RResult<()> {
        match (self, key) {
            (Self::Array(items), Self::Integer(index)) => {
                let mut items = items.borrow_mut();
                let len = items.len();
                let slot = usize::try_from(*index)
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or(RuntimeError::IndexOutOfRange { index: *index, len })?;
                *slot = value;
                Ok(())
            },
            (Self::Map(entries), Self::String(name)) => {
                entries.borrow_mut().insert(name.to_string(), value);
                Ok(())
            },
            (Self::Instance(instance), Self::String(name)) => {
                instance.set(name, value);
                Ok(())
            },
            (Self::Array(_) | Self::Map(_) | Self::Instance(_), _) => {
                Err(RuntimeError::KeyType { target: self.kind(), key: key.kind() })
            },
            _ => Err(self.unsupported("set a member of", key)),
        }
    }

    /// Copie « défaut de classe » : tableaux et maps sont dupliqués (un niveau),
    /// le reste partagé.
    pub fn detached(&self) -> Self {
        match self {
            Self::Array(items) => Self::array(items.borrow().clone()),
            Self::Map(entries) => Self::map(entries.borrow().clone()),
            other => other.clone(),
        }
    }

    fn write_nested(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        match self {
            Self::String(s) if depth > 0 => write!(f, "{s:?}"),
            Self::Array(items) => {
                if depth > MAX_DISPLAY_DEPTH {
                    return f.write_str("[…]");
                }
                f.write_str("[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.write_nested(f, depth + 1)?;
                }
                f.write_str("]")
            },
            Self::Map(entries) => {
                if depth > MAX_DISPLAY_DEPTH {
                    return f.write_str("{…}");
                }
                f.write_str("{")?;
                for (i, (key, value)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: ")?;
                    value.write_nested(f, depth + 1)?;
                }
                f.write_str("}")
            },
            other => write_scalar(other, f),
        }
    }
}

const MAX_DISPLAY_DEPTH: usize = 8;

fn write_scalar(object: &Object, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match object {
        Object::Integer(i) => write!(f, "{i}"),
        Object::Float(x) => write!(f, "{x}"),
        Object::String(s) => f.write_str(s),
        Object::Boolean(b) => write!(f, "{b}"),
        Object::Null => f.write_str("null"),
        Object::ScriptFunction(func) => write!(f, "<script function/{}>", func.parameter_count),
        Object::Closure(c) => write!(f, "<function/{}>", c.function.parameter_count),
        Object::NativeFunction(n) => write!(f, "<native {}>", n.name),
        Object::MemberFunction(m) => write!(f, "<method/{}>", m.closure.function.parameter_count),
        Object::Class(c) => write!(f, "<class/{}>", c.members().len()),
        Object::Instance(_) => f.write_str("<instance>"),
        Object::Array(_) | Object::Map(_) => unreachable!("containers are written by write_nested"),
    }
}

/// Forme texte : c'est aussi celle de la concaténation et de `to_string()`.
impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_nested(f, 0)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind())?;
        self.write_nested(f, 1)?;
        f.write_str(")")
    }
}

impl From<i64> for Object {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Object {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Object {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Object {
    fn from(v: &str) -> Self {
        Self::string(v)
    }
}

impl From<String> for Object {
    fn from(v: String) -> Self {
        Self::String(Rc::from(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn float_contagion() {
        assert!(matches!(Object::Integer(1).add(&Object::Float(0.5)), Ok(Object::Float(x)) if x == 1.5));
        assert!(matches!(Object::Float(3.0).div(&Object::Integer(2)), Ok(Object::Float(x)) if x == 1.5));
        assert!(matches!(Object::Integer(7).div(&Object::Integer(2)), Ok(Object::Integer(3))));
    }

    #[test]
    fn string_concatenation_stringifies_the_other_side() {
        let s = Object::from("n=").add(&Object::Integer(4)).unwrap();
        assert_eq!(s.to_string(), "n=4");
        let s = Object::Float(1.5).add(&Object::from("!")).unwrap();
        assert_eq!(s.to_string(), "1.5!");
    }

    #[test]
    fn unsupported_names_both_kinds() {
        let err = Object::Boolean(true).add(&Object::array(vec![])).unwrap_err();
        assert_eq!(err, RuntimeError::Unsupported { op: "add", left: "Boolean", right: "Array" });
        assert_eq!(err.to_string(), "can not add Boolean and Array");
    }

    #[test]
    fn integer_errors() {
        assert_eq!(Object::Integer(1).div(&Object::Integer(0)).unwrap_err(), RuntimeError::DivisionByZero);
        assert_eq!(
            Object::Integer(i64::MAX).add(&Object::Integer(1)).unwrap_err(),
            RuntimeError::Overflow("add")
        );
    }

    #[test]
    fn equality_rules() {
        assert!(Object::Integer(2).equals(&Object::Integer(2)));
        assert!(!Object::Integer(1).equals(&Object::Float(1.0)));
        assert!(Object::from("a").equals(&Object::from("a")));
        let a = Object::array(vec![]);
        let b = Object::array(vec![]);
        assert!(a.equals(&a.clone()));
        assert!(!a.equals(&b));
        assert!(!Object::Integer(1).same_constant(&Object::Float(1.0)));
        assert!(!Object::Float(0.0).same_constant(&Object::Float(-0.0)));
        assert!(!a.same_constant(&a.clone()));
    }

    #[test]
    fn boolean_coercion() {
        assert!(!Object::Null.as_boolean().unwrap());
        assert!(!Object::from("").as_boolean().unwrap());
        assert!(Object::from("x").as_boolean().unwrap());
        assert!(!Object::Float(0.0).as_boolean().unwrap());
        assert_eq!(
            Object::array(vec![]).as_boolean().unwrap_err(),
            RuntimeError::NotBoolean("Array")
        );
    }

    #[test]
    fn comparisons() {
        assert!(matches!(Object::Integer(1).less(&Object::Float(1.5)), Ok(Object::Boolean(true))));
        assert!(matches!(Object::from("b").greater_equal(&Object::from("a")), Ok(Object::Boolean(true))));
        assert!(Object::Null.less(&Object::Integer(1)).is_err());
    }

    #[test]
    fn array_indexing() {
        let arr = Object::array(vec![Object::Integer(10), Object::Integer(20)]);
        assert!(matches!(arr.get_member(&Object::Integer(1)), Ok(Some(Object::Integer(20)))));
        assert!(matches!(arr.get_member(&Object::Integer(5)), Ok(Some(Object::Null))));
        assert!(matches!(arr.get_member(&Object::Integer(-1)), Ok(Some(Object::Null))));
        assert_eq!(
            arr.set_member(&Object::Integer(2), Object::Null).unwrap_err(),
            RuntimeError::IndexOutOfRange { index: 2, len: 2 }
        );
        arr.set_member(&Object::Integer(0), Object::Integer(1)).unwrap();
        assert_eq!(arr.to_string(), "[1, 20]");
        assert_eq!(
            arr.get_member(&Object::Boolean(true)).unwrap_err(),
            RuntimeError::KeyType { target: "Array", key: "Boolean" }
        );
    }

    #[test]
    fn map_access() {
        let map = Object::map(IndexMap::new());
        map.set_member(&Object::from("k"), Object::from("v")).unwrap();
        assert_eq!(map.to_string(), "{k: \"v\"}");
        assert!(matches!(map.get_member(&Object::from("missing")), Ok(Some(Object::Null))));
        assert!(matches!(map.get_member(&Object::from("size")), Ok(Some(Object::NativeFunction(_)))));
        assert!(map.set_member(&Object::Integer(1), Object::Null).is_err());
    }

    #[test]
    fn every_value_has_to_string() {
        for v in [Object::Integer(1), Object::Null, Object::from("s"), Object::array(vec![])] {
            assert!(matches!(v.get_member(&Object::from("to_string")), Ok(Some(Object::NativeFunction(_)))));
        }
        assert!(matches!(Object::Integer(1).get_member(&Object::from("nope")), Ok(None)));
    }

    #[test]
    fn detached_copies_containers() {
        let arr = Object::array(vec![Object::Integer(1)]);
        let copy = arr.detached();
        assert!(!arr.equals(&copy));
        copy.set_member(&Object::Integer(0), Object::Integer(9)).unwrap();
        assert_eq!(arr.to_string(), "[1]");
    }

    #[test]
    fn self_containing_array_displays() {
        let arr = Object::array(vec![]);
        if let Object::Array(items) = &arr {
            items.borrow_mut().push(arr.clone());
        }
        assert!(arr.to_string().contains('…'));
    }

    proptest! {
        #[test]
        fn integer_arithmetic_matches_checked_ops(a in any::<i32>(), b in any::<i32>()) {
            let (x, y) = (Object::Integer(a.into()), Object::Integer(b.into()));
            prop_assert!(matches!(x.add(&y), Ok(Object::Integer(v)) if v == i64::from(a) + i64::from(b)));
            prop_assert!(matches!(x.mul(&y), Ok(Object::Integer(v)) if v == i64::from(a) * i64::from(b)));
            prop_assert!(matches!(x.less(&y), Ok(Object::Boolean(v)) if v == (a < b)));
        }
    }
}
