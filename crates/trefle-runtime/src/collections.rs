//! Méthodes natives des tableaux et des maps.
//!
//! Chaque accès `tableau.append` crée une native qui capture le conteneur :
//! `local f = a.append  f(1)` modifie bien `a`.

use std::rc::Rc;

use crate::{
    error::RuntimeError,
    function::native,
    object::{ArrayRef, MapRef, Object},
};

/// Méthode `name` d'un tableau.
pub fn array_method(items: &ArrayRef, name: &str) -> Option<Object> {
    let items = Rc::clone(items);
    let method = match name {
        "size" => native("size", Some(0), move |_, _| Ok(Object::Integer(len_of(items.borrow().len())))),
        "empty" => native("empty", Some(0), move |_, _| Ok(Object::Boolean(items.borrow().is_empty()))),
        "append" => native("append", Some(1), move |_, mut args| {
            let value = args.pop().unwrap_or_default();
            items.borrow_mut().push(value.clone());
            Ok(value)
        }),
        "remove" => native("remove", Some(1), move |_, args| match args.first() {
            Some(Object::Integer(index)) => {
                let mut items = items.borrow_mut();
                Ok(usize::try_from(*index)
                    .ok()
                    .filter(|&i| i < items.len())
                    .map(|i| items.remove(i))
                    .unwrap_or_default())
            },
            other => Err(RuntimeError::KeyType {
                target: "Array",
                key: other.map_or("Null", Object::kind),
            }),
        }),
        "to_string" => to_string_method(&Object::Array(items)),
        _ => return None,
    };
    Some(method)
}

/// Méthode `name` d'une map (consultée après les entrées).
pub fn map_method(entries: &MapRef, name: &str) -> Option<Object> {
    let entries = Rc::clone(entries);
    let method = match name {
        "size" => native("size", Some(0), move |_, _| Ok(Object::Integer(len_of(entries.borrow().len())))),
        "empty" => native("empty", Some(0), move |_, _| Ok(Object::Boolean(entries.borrow().is_empty()))),
        "add" => native("add", Some(2), move |_, mut args| {
            let value = args.pop().unwrap_or_default();
            match args.pop() {
                Some(Object::String(key)) => {
                    entries.borrow_mut().insert(key.to_string(), value.clone());
                    Ok(value)
                },
                other => Err(RuntimeError::KeyType {
                    target: "Map",
                    key: other.as_ref().map_or("Null", Object::kind),
                }),
            }
        }),
        "remove" => native("remove", Some(1), move |_, args| match args.first() {
            Some(Object::String(key)) => Ok(entries.borrow_mut().shift_remove(&**key).unwrap_or_default()),
            other => Err(RuntimeError::KeyType { target: "Map", key: other.map_or("Null", Object::kind) }),
        }),
        "to_string" => to_string_method(&Object::Map(entries)),
        _ => return None,
    };
    Some(method)
}

/// `valeur.to_string()`, défini pour toute valeur.
pub fn to_string_method(receiver: &Object) -> Object {
    let receiver = receiver.clone();
    native("to_string", Some(0), move |_, _| Ok(Object::string(receiver.to_string())))
}

#[allow(clippy::cast_possible_wrap)]
const fn len_of(len: usize) -> i64 {
    len as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::RResult, function::VmHandle};
    use pretty_assertions::assert_eq;

    /// Hôte minimal : les méthodes de conteneurs ne rappellent jamais la VM.
    struct NoVm(Vec<u8>);

    impl VmHandle for NoVm {
        fn call(&mut self, _: &Object, _: Vec<Object>) -> RResult<Object> {
            Err(RuntimeError::Native("no vm".into()))
        }

        fn stdout(&mut self) -> &mut dyn std::io::Write {
            &mut self.0
        }
    }

    fn invoke(method: Option<Object>, args: Vec<Object>) -> RResult<Object> {
        match method {
            Some(Object::NativeFunction(f)) => f.invoke(&mut NoVm(Vec::new()), args),
            other => panic!("not a native: {other:?}"),
        }
    }

    #[test]
    fn array_methods_share_the_container() {
        let arr = Object::array(vec![Object::Integer(1)]);
        let Object::Array(items) = &arr else { unreachable!() };
        let appended = invoke(array_method(items, "append"), vec![Object::from("x")]).unwrap();
        assert_eq!(appended.to_string(), "x");
        assert_eq!(arr.to_string(), "[1, \"x\"]");
        assert!(matches!(invoke(array_method(items, "size"), vec![]), Ok(Object::Integer(2))));
        assert!(matches!(invoke(array_method(items, "remove"), vec![Object::Integer(0)]), Ok(Object::Integer(1))));
        assert!(matches!(invoke(array_method(items, "remove"), vec![Object::Integer(7)]), Ok(Object::Null)));
        assert!(matches!(invoke(array_method(items, "empty"), vec![]), Ok(Object::Boolean(false))));
        assert!(array_method(items, "push").is_none());
    }

    #[test]
    fn map_methods() {
        let map = Object::map(indexmap::IndexMap::new());
        let Object::Map(entries) = &map else { unreachable!() };
        invoke(map_method(entries, "add"), vec![Object::from("a"), Object::Integer(1)]).unwrap();
        invoke(map_method(entries, "add"), vec![Object::from("b"), Object::Integer(2)]).unwrap();
        assert_eq!(map.to_string(), "{a: 1, b: 2}");
        assert!(matches!(invoke(map_method(entries, "remove"), vec![Object::from("a")]), Ok(Object::Integer(1))));
        assert!(matches!(invoke(map_method(entries, "remove"), vec![Object::from("zz")]), Ok(Object::Null)));
        assert_eq!(
            invoke(map_method(entries, "add"), vec![Object::Integer(1), Object::Null]).unwrap_err(),
            RuntimeError::KeyType { target: "Map", key: "Integer" }
        );
        let text = invoke(map_method(entries, "to_string"), vec![]).unwrap();
        assert_eq!(text.to_string(), "{b: 2}");
    }
}
