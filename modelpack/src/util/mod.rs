/*!
 This module defines common utilities used across the loading pipeline.
*/

pub mod device;
pub mod observer;
pub mod output;
