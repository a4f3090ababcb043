pub mod in_memory;
pub mod ldap;

pub use in_memory::InMemoryDirectory;
pub use ldap::LdapDirectory;
