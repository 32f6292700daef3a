//! Embedded message catalogs.
//!
//! Each table maps a message key to its text. `{n}` marks the n-th argument.
//! Translations only list the keys they translate; lookups fall back to the
//! root table.

use crate::Domain;

pub(crate) type Table = &'static [(&'static str, &'static str)];

pub(crate) const BAD_MESSAGE_KEY: &str = "BadMessageKey";

const DOM_ROOT: Table = &[
    (BAD_MESSAGE_KEY, "The error message corresponding to the message key can not be found."),
    ("FormatFailed", "An internal error occurred while formatting the following message:"),
    ("INDEX_SIZE_ERR", "The index or size is negative, or greater than the allowed value."),
    ("DOMSTRING_SIZE_ERR", "The specified range of text does not fit into a DOMString."),
    ("HIERARCHY_REQUEST_ERR", "An attempt was made to insert a node where it is not permitted."),
    ("WRONG_DOCUMENT_ERR", "A node is used in a different document than the one that created it."),
    ("INVALID_CHARACTER_ERR", "An invalid or illegal XML character is specified."),
    ("NO_DATA_ALLOWED_ERR", "Data is specified for a node which does not support data."),
    ("NO_MODIFICATION_ALLOWED_ERR", "An attempt is made to modify an object where modifications are not allowed."),
    ("NOT_FOUND_ERR", "An attempt is made to reference a node in a context where it does not exist."),
    ("NOT_SUPPORTED_ERR", "The implementation does not support the requested type of object or operation."),
    ("INUSE_ATTRIBUTE_ERR", "An attempt is made to add an attribute that is already in use elsewhere."),
    ("INVALID_STATE_ERR", "An attempt is made to use an object that is not, or is no longer, usable."),
    ("SYNTAX_ERR", "An invalid or illegal string is specified."),
    ("INVALID_MODIFICATION_ERR", "An attempt is made to modify the type of the underlying object."),
    ("NAMESPACE_ERR", "An attempt is made to create or change an object in a way which is incorrect with regard to namespaces."),
    ("INVALID_ACCESS_ERR", "A parameter or an operation is not supported by the underlying object."),
    ("VALIDATION_ERR", "A call to a method such as insertBefore or removeChild would make the Node invalid with respect to document grammar."),
    ("TYPE_MISMATCH_ERR", "The value type for this parameter name is incompatible with the expected value type."),
    ("FEATURE_NOT_SUPPORTED", "The parameter {0} is recognized but the requested value cannot be set."),
    ("FEATURE_NOT_FOUND", "The parameter {0} is not recognized."),
    ("LEVEL3_NOT_SUPPORTED", "DOM Level 3 operations are not supported."),
];

const DOM_FR: Table = &[
    ("INDEX_SIZE_ERR", "L'index ou la taille est négatif, ou supérieur à la valeur autorisée."),
    ("HIERARCHY_REQUEST_ERR", "Tentative d'insertion d'un noeud à un emplacement où il n'est pas autorisé."),
    ("NOT_FOUND_ERR", "Tentative de référencement d'un noeud dans un contexte où il n'existe pas."),
    ("NAMESPACE_ERR", "Tentative de création ou de modification d'un objet de manière incorrecte par rapport aux espaces de noms."),
    ("FEATURE_NOT_FOUND", "Le paramètre {0} n'est pas reconnu."),
];

const DOM_DE: Table = &[
    ("INDEX_SIZE_ERR", "Der Index oder die Größe ist negativ oder größer als der zulässige Wert."),
    ("NOT_FOUND_ERR", "Es wurde versucht, einen Knoten in einem Kontext zu referenzieren, in dem er nicht vorhanden ist."),
    ("FEATURE_NOT_FOUND", "Der Parameter {0} wird nicht erkannt."),
];

const XML_ROOT: Table = &[
    (BAD_MESSAGE_KEY, "The error message corresponding to the message key can not be found."),
    ("FormatFailed", "An internal error occurred while formatting the following message:"),
    ("InvalidCharInContent", "An invalid XML character (Unicode: 0x{0}) was found in the element content of the document."),
    ("ElementUnterminated", "Element type \"{0}\" must be followed by either attribute specifications, \">\" or \"/>\"."),
    ("ETagRequired", "The element type \"{0}\" must be terminated by the matching end-tag \"</{0}>\"."),
    ("AttributeNotUnique", "Attribute \"{1}\" was already specified for element \"{0}\"."),
    ("PrefixDeclared", "The namespace prefix \"{0}\" was not declared."),
];

const XML_FR: Table = &[
    ("PrefixDeclared", "Le préfixe d'espace de noms \"{0}\" n'a pas été déclaré."),
];

const SERIALIZER_ROOT: Table = &[
    (BAD_MESSAGE_KEY, "The error message corresponding to the message key can not be found."),
    ("FormatFailed", "An internal error occurred while formatting the following message:"),
    ("ArgumentIsNull", "Argument '{0}' is null."),
    ("NoWriterSupplied", "No writer supplied for serializer."),
    ("MethodNotSupported", "The method '{0}' is not supported by this factory."),
    ("ResetInMiddle", "The serializer may not be reset in the middle of serialization."),
    ("IllegalCharacter", "Attempt to output character of integral value {0} that is not represented in specified output encoding of {1}."),
];

/// Tables for `domain`, keyed by locale tag (`""` is the root).
pub(crate) fn tables(domain: Domain) -> &'static [(&'static str, Table)] {
    match domain {
        Domain::Dom => &[("", DOM_ROOT), ("fr", DOM_FR), ("de", DOM_DE)],
        Domain::Xml => &[("", XML_ROOT), ("fr", XML_FR)],
        Domain::Serializer => &[("", SERIALIZER_ROOT)],
    }
}

pub(crate) fn lookup(table: Table, key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, text)| *text)
}
